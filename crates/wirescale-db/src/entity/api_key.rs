//! api key entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};

use wirescale_types::ApiKey;

/// api key database model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// searchable prefix, unique
    pub prefix: String,

    /// bcrypt hash of the secret remainder
    pub hash: String,

    pub expiration: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ApiKey {
    fn from(model: Model) -> Self {
        ApiKey {
            id: model.id as u64,
            prefix: model.prefix,
            hash: model.hash,
            expiration: model.expiration,
            last_seen: model.last_seen,
            created_at: model.created_at,
        }
    }
}

impl From<&ApiKey> for ActiveModel {
    fn from(key: &ApiKey) -> Self {
        ActiveModel {
            id: if key.id == 0 { NotSet } else { Set(key.id as i64) },
            prefix: Set(key.prefix.clone()),
            hash: Set(key.hash.clone()),
            expiration: Set(key.expiration),
            last_seen: Set(key.last_seen),
            created_at: Set(key.created_at),
            deleted_at: NotSet,
        }
    }
}
