//! pre-auth key entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};

use wirescale_types::{NamespaceId, PreAuthKey};

/// pre-auth key database model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pre_auth_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// display prefix, unique and used for lookup
    pub key_prefix: String,

    /// sha-256 hash of the full secret, hex-encoded
    pub key_hash: String,

    pub namespace_id: i64,

    pub reusable: bool,
    pub ephemeral: bool,
    pub used: bool,

    pub expiration: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::namespace::Entity",
        from = "Column::NamespaceId",
        to = "super::namespace::Column::Id"
    )]
    Namespace,
}

impl Related<super::namespace::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Namespace.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for PreAuthKey {
    fn from(model: Model) -> Self {
        PreAuthKey {
            id: model.id as u64,
            key_prefix: model.key_prefix,
            key_hash: model.key_hash,
            namespace_id: NamespaceId(model.namespace_id as u64),
            reusable: model.reusable,
            ephemeral: model.ephemeral,
            used: model.used,
            expiration: model.expiration,
            created_at: model.created_at,
        }
    }
}

impl From<&PreAuthKey> for ActiveModel {
    fn from(key: &PreAuthKey) -> Self {
        ActiveModel {
            id: if key.id == 0 { NotSet } else { Set(key.id as i64) },
            key_prefix: Set(key.key_prefix.clone()),
            key_hash: Set(key.key_hash.clone()),
            namespace_id: Set(key.namespace_id.0 as i64),
            reusable: Set(key.reusable),
            ephemeral: Set(key.ephemeral),
            used: Set(key.used),
            expiration: Set(key.expiration),
            created_at: Set(key.created_at),
            deleted_at: NotSet,
        }
    }
}
