//! node entity for database storage.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use wirescale_types::{
    DiscoKey, HostInfo, MachineKey, NamespaceId, Node, NodeId, NodeKey, RegisterMethod,
};

/// node database model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// machine key bytes
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub machine_key: Vec<u8>,

    /// node key bytes
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub node_key: Vec<u8>,

    /// disco key bytes
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub disco_key: Vec<u8>,

    /// json-serialized vec<socketaddr>
    #[sea_orm(column_type = "Text")]
    pub endpoints: String,

    /// json-serialized hostinfo
    #[sea_orm(column_type = "Text", nullable)]
    pub hostinfo: Option<String>,

    /// ipv4 address as string
    pub ipv4: Option<String>,

    /// ipv6 address as string
    pub ipv6: Option<String>,

    pub hostname: String,
    pub given_name: String,

    pub namespace_id: i64,

    /// registermethod as string
    pub register_method: String,

    pub auth_key_id: Option<i64>,

    /// whether this is an ephemeral node
    pub ephemeral: bool,

    pub expiry: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_successful_update: Option<DateTime<Utc>>,

    /// json-serialized vec<ipnet>
    #[sea_orm(column_type = "Text")]
    pub enabled_routes: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
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
    #[sea_orm(
        belongs_to = "super::pre_auth_key::Entity",
        from = "Column::AuthKeyId",
        to = "super::pre_auth_key::Column::Id"
    )]
    AuthKey,
}

impl Related<super::namespace::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Namespace.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Node {
    fn from(model: Model) -> Self {
        let endpoints: Vec<SocketAddr> = match serde_json::from_str(&model.endpoints) {
            Ok(v) => v,
            Err(e) => {
                warn!(node_id = model.id, error = %e, "failed to parse node endpoints JSON, using empty list");
                Vec::new()
            }
        };
        let hostinfo: Option<HostInfo> =
            model
                .hostinfo
                .as_ref()
                .and_then(|s| match serde_json::from_str(s) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(node_id = model.id, error = %e, "failed to parse node hostinfo JSON");
                        None
                    }
                });
        let enabled_routes: Vec<IpNet> = match serde_json::from_str(&model.enabled_routes) {
            Ok(v) => v,
            Err(e) => {
                warn!(node_id = model.id, error = %e, "failed to parse enabled routes JSON, using empty list");
                Vec::new()
            }
        };

        Node {
            id: NodeId(model.id as u64),
            machine_key: MachineKey::from_bytes(model.machine_key),
            node_key: NodeKey::from_bytes(model.node_key),
            disco_key: DiscoKey::from_bytes(model.disco_key),
            endpoints,
            hostinfo,
            ipv4: model.ipv4.and_then(|s| s.parse::<IpAddr>().ok()),
            ipv6: model.ipv6.and_then(|s| s.parse::<IpAddr>().ok()),
            hostname: model.hostname,
            given_name: model.given_name,
            namespace_id: NamespaceId(model.namespace_id as u64),
            register_method: RegisterMethod::parse(&model.register_method),
            auth_key_id: model.auth_key_id.map(|id| id as u64),
            ephemeral: model.ephemeral,
            expiry: model.expiry,
            last_seen: model.last_seen,
            last_successful_update: model.last_successful_update,
            enabled_routes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<&Node> for ActiveModel {
    fn from(node: &Node) -> Self {
        ActiveModel {
            id: if node.id.0 == 0 {
                NotSet
            } else {
                Set(node.id.0 as i64)
            },
            machine_key: Set(node.machine_key.as_bytes().to_vec()),
            node_key: Set(node.node_key.as_bytes().to_vec()),
            disco_key: Set(node.disco_key.as_bytes().to_vec()),
            endpoints: Set(serde_json::to_string(&node.endpoints).unwrap_or_else(|_| "[]".into())),
            hostinfo: Set(node
                .hostinfo
                .as_ref()
                .and_then(|h| serde_json::to_string(h).ok())),
            ipv4: Set(node.ipv4.map(|ip| ip.to_string())),
            ipv6: Set(node.ipv6.map(|ip| ip.to_string())),
            hostname: Set(node.hostname.clone()),
            given_name: Set(node.given_name.clone()),
            namespace_id: Set(node.namespace_id.0 as i64),
            register_method: Set(node.register_method.as_str().to_string()),
            auth_key_id: Set(node.auth_key_id.map(|id| id as i64)),
            ephemeral: Set(node.ephemeral),
            expiry: Set(node.expiry),
            last_seen: Set(node.last_seen),
            last_successful_update: Set(node.last_successful_update),
            enabled_routes: Set(
                serde_json::to_string(&node.enabled_routes).unwrap_or_else(|_| "[]".into())
            ),
            created_at: Set(node.created_at),
            updated_at: Set(node.updated_at),
            deleted_at: NotSet,
        }
    }
}
