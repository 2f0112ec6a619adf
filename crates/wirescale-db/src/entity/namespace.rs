//! namespace entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};

use wirescale_types::{Namespace, NamespaceId};

/// namespace database model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "namespaces")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// unique dns-label shaped name
    pub name: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::node::Entity")]
    Nodes,
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Nodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Namespace {
    fn from(model: Model) -> Self {
        Namespace {
            id: NamespaceId(model.id as u64),
            name: model.name,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<&Namespace> for ActiveModel {
    fn from(ns: &Namespace) -> Self {
        ActiveModel {
            id: if ns.id.0 == 0 {
                NotSet
            } else {
                Set(ns.id.0 as i64)
            },
            name: Set(ns.name.clone()),
            created_at: Set(ns.created_at),
            updated_at: Set(ns.updated_at),
            deleted_at: NotSet,
        }
    }
}
