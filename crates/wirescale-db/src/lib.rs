//! database layer for wirescale.
//!
//! this crate provides persistent storage for:
//! - Nodes
//! - Namespaces
//! - PreAuthKeys
//! - API Keys
//!
//! it also owns overlay ip address allocation for new nodes.

#![warn(missing_docs)]

mod entity;
mod error;
mod ip_allocator;
mod migration;

pub use error::Error;
pub use ip_allocator::IpAllocator;

use std::future::Future;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database as SeaOrmDatabase, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use sea_orm_migration::MigratorTrait;

use wirescale_types::{
    ApiKey, Config, MachineKey, Namespace, NamespaceId, Node, NodeId, NodeKey, PreAuthKey,
};

/// result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// database trait for wirescale storage operations.
///
/// this trait abstracts over different database backends (sqlite,
/// postgresql). all operations use soft-delete semantics - records are
/// marked with a `deleted_at` timestamp rather than being physically
/// removed.
pub trait Database: Send + Sync {
    /// ping the database to verify connectivity.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    // namespace operations

    /// create a new namespace. returns the created row with its id.
    fn create_namespace(&self, ns: &Namespace) -> impl Future<Output = Result<Namespace>> + Send;

    /// get a namespace by id. returns `None` if not found or soft-deleted.
    fn get_namespace(
        &self,
        id: NamespaceId,
    ) -> impl Future<Output = Result<Option<Namespace>>> + Send;

    /// get a namespace by name.
    fn get_namespace_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Namespace>>> + Send;

    /// list all non-deleted namespaces.
    fn list_namespaces(&self) -> impl Future<Output = Result<Vec<Namespace>>> + Send;

    /// soft-delete a namespace.
    fn delete_namespace(&self, id: NamespaceId) -> impl Future<Output = Result<()>> + Send;

    // node operations

    /// create a new node. returns the created node with its assigned id.
    fn create_node(&self, node: &Node) -> impl Future<Output = Result<Node>> + Send;

    /// get a node by id.
    fn get_node(&self, id: NodeId) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// get a node by its machine key.
    fn get_node_by_machine_key(
        &self,
        machine_key: &MachineKey,
    ) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// get a node by its current node key.
    fn get_node_by_node_key(
        &self,
        node_key: &NodeKey,
    ) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// list all non-deleted nodes.
    fn list_nodes(&self) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// list all nodes in a namespace.
    fn list_nodes_in_namespace(
        &self,
        namespace_id: NamespaceId,
    ) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// update an existing node. also bumps `updated_at`.
    fn update_node(&self, node: &Node) -> impl Future<Output = Result<Node>> + Send;

    /// set a node's expiry.
    fn expire_node(
        &self,
        id: NodeId,
        expiry: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// soft-delete a node.
    fn delete_node(&self, id: NodeId) -> impl Future<Output = Result<()>> + Send;

    // pre-auth key operations

    /// create a new pre-auth key. returns the key with its assigned id.
    fn create_preauth_key(
        &self,
        key: &PreAuthKey,
    ) -> impl Future<Output = Result<PreAuthKey>> + Send;

    /// get a pre-auth key by its display prefix.
    fn get_preauth_key_by_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Option<PreAuthKey>>> + Send;

    /// list all pre-auth keys for a namespace.
    fn list_preauth_keys(
        &self,
        namespace_id: NamespaceId,
    ) -> impl Future<Output = Result<Vec<PreAuthKey>>> + Send;

    /// mark a one-shot pre-auth key as used.
    fn mark_preauth_key_used(&self, id: u64) -> impl Future<Output = Result<()>> + Send;

    /// expire a pre-auth key by setting its expiration to now.
    fn expire_preauth_key(&self, id: u64) -> impl Future<Output = Result<()>> + Send;

    // api key operations

    /// create a new api key. returns the key with its assigned id.
    fn create_api_key(&self, key: &ApiKey) -> impl Future<Output = Result<ApiKey>> + Send;

    /// get an api key by its searchable prefix.
    fn get_api_key_by_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Option<ApiKey>>> + Send;

    /// list all api keys.
    fn list_api_keys(&self) -> impl Future<Output = Result<Vec<ApiKey>>> + Send;

    /// expire an api key by setting its expiration to now.
    fn expire_api_key(&self, id: u64) -> impl Future<Output = Result<()>> + Send;

    /// update the `last_seen` timestamp for an api key.
    fn touch_api_key(&self, id: u64) -> impl Future<Output = Result<()>> + Send;
}

/// the main database implementation using sea-orm.
#[derive(Clone)]
pub struct WirescaleDb {
    conn: DatabaseConnection,
}

impl WirescaleDb {
    /// create a new database connection from config and run migrations.
    pub async fn new(config: &Config) -> Result<Self> {
        let url = Self::build_connection_url(&config.database)?;
        let conn: DatabaseConnection = SeaOrmDatabase::connect(&url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// build a sea-orm compatible connection url from config.
    fn build_connection_url(config: &wirescale_types::DatabaseConfig) -> Result<String> {
        match config.db_type.as_str() {
            "sqlite" => {
                let path = if config.connection_string.starts_with("sqlite:") {
                    config.connection_string.clone()
                } else {
                    format!("sqlite:{}", config.connection_string)
                };
                // mode=rwc creates the file if it doesn't exist
                if path.contains('?') {
                    Ok(path)
                } else {
                    Ok(format!("{}?mode=rwc", path))
                }
            }
            "postgres" | "postgresql" => Ok(config.connection_string.clone()),
            other => Err(Error::InvalidData(format!(
                "unsupported database type: {}",
                other
            ))),
        }
    }

    /// create an in-memory sqlite database for testing.
    pub async fn new_in_memory() -> Result<Self> {
        let conn: DatabaseConnection = SeaOrmDatabase::connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        migration::Migrator::up(&self.conn, None)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        Ok(())
    }

    /// ip addresses currently assigned to live nodes, for allocator seeding.
    pub async fn allocated_ips(&self) -> Result<Vec<std::net::IpAddr>> {
        let nodes = self.list_nodes().await?;
        Ok(nodes.iter().flat_map(|n| n.ips()).collect())
    }
}

impl Database for WirescaleDb {
    async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(())
    }

    // namespace operations

    async fn create_namespace(&self, ns: &Namespace) -> Result<Namespace> {
        let model: entity::namespace::ActiveModel = ns.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_namespace(&self, id: NamespaceId) -> Result<Option<Namespace>> {
        let result = entity::namespace::Entity::find_by_id(id.0 as i64)
            .filter(entity::namespace::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_namespace_by_name(&self, name: &str) -> Result<Option<Namespace>> {
        let result = entity::namespace::Entity::find()
            .filter(entity::namespace::Column::Name.eq(name))
            .filter(entity::namespace::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let results = entity::namespace::Entity::find()
            .filter(entity::namespace::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn delete_namespace(&self, id: NamespaceId) -> Result<()> {
        entity::namespace::Entity::update_many()
            .col_expr(
                entity::namespace::Column::DeletedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(entity::namespace::Column::Id.eq(id.0 as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    // node operations

    async fn create_node(&self, node: &Node) -> Result<Node> {
        let model: entity::node::ActiveModel = node.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let result = entity::node::Entity::find_by_id(id.0 as i64)
            .filter(entity::node::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_node_by_machine_key(&self, machine_key: &MachineKey) -> Result<Option<Node>> {
        let result = entity::node::Entity::find()
            .filter(entity::node::Column::MachineKey.eq(machine_key.as_bytes()))
            .filter(entity::node::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_node_by_node_key(&self, node_key: &NodeKey) -> Result<Option<Node>> {
        let result = entity::node::Entity::find()
            .filter(entity::node::Column::NodeKey.eq(node_key.as_bytes()))
            .filter(entity::node::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let results = entity::node::Entity::find()
            .filter(entity::node::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn list_nodes_in_namespace(&self, namespace_id: NamespaceId) -> Result<Vec<Node>> {
        let results = entity::node::Entity::find()
            .filter(entity::node::Column::NamespaceId.eq(namespace_id.0 as i64))
            .filter(entity::node::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn update_node(&self, node: &Node) -> Result<Node> {
        let mut model: entity::node::ActiveModel = node.into();
        model.updated_at = Set(Utc::now());
        let result = model.update(&self.conn).await?;
        Ok(result.into())
    }

    async fn expire_node(&self, id: NodeId, expiry: Option<DateTime<Utc>>) -> Result<()> {
        entity::node::Entity::update_many()
            .col_expr(
                entity::node::Column::Expiry,
                sea_orm::sea_query::Expr::value(expiry),
            )
            .filter(entity::node::Column::Id.eq(id.0 as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn delete_node(&self, id: NodeId) -> Result<()> {
        entity::node::Entity::update_many()
            .col_expr(
                entity::node::Column::DeletedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(entity::node::Column::Id.eq(id.0 as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    // pre-auth key operations

    async fn create_preauth_key(&self, key: &PreAuthKey) -> Result<PreAuthKey> {
        let model: entity::pre_auth_key::ActiveModel = key.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_preauth_key_by_prefix(&self, prefix: &str) -> Result<Option<PreAuthKey>> {
        let result = entity::pre_auth_key::Entity::find()
            .filter(entity::pre_auth_key::Column::KeyPrefix.eq(prefix))
            .filter(entity::pre_auth_key::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_preauth_keys(&self, namespace_id: NamespaceId) -> Result<Vec<PreAuthKey>> {
        let results = entity::pre_auth_key::Entity::find()
            .filter(entity::pre_auth_key::Column::NamespaceId.eq(namespace_id.0 as i64))
            .filter(entity::pre_auth_key::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn mark_preauth_key_used(&self, id: u64) -> Result<()> {
        entity::pre_auth_key::Entity::update_many()
            .col_expr(
                entity::pre_auth_key::Column::Used,
                sea_orm::sea_query::Expr::value(true),
            )
            .filter(entity::pre_auth_key::Column::Id.eq(id as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn expire_preauth_key(&self, id: u64) -> Result<()> {
        entity::pre_auth_key::Entity::update_many()
            .col_expr(
                entity::pre_auth_key::Column::Expiration,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(entity::pre_auth_key::Column::Id.eq(id as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    // api key operations

    async fn create_api_key(&self, key: &ApiKey) -> Result<ApiKey> {
        let model: entity::api_key::ActiveModel = key.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>> {
        let result = entity::api_key::Entity::find()
            .filter(entity::api_key::Column::Prefix.eq(prefix))
            .filter(entity::api_key::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        let results = entity::api_key::Entity::find()
            .filter(entity::api_key::Column::DeletedAt.is_null())
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn expire_api_key(&self, id: u64) -> Result<()> {
        entity::api_key::Entity::update_many()
            .col_expr(
                entity::api_key::Column::Expiration,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(entity::api_key::Column::Id.eq(id as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn touch_api_key(&self, id: u64) -> Result<()> {
        entity::api_key::Entity::update_many()
            .col_expr(
                entity::api_key::Column::LastSeen,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(entity::api_key::Column::Id.eq(id as i64))
            .exec(&self.conn)
            .await?;
        Ok(())
    }
}
