//! database migrations for wirescale.

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_namespaces;
mod m20260301_000002_create_pre_auth_keys;
mod m20260301_000003_create_nodes;
mod m20260301_000004_create_api_keys;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_namespaces::Migration),
            Box::new(m20260301_000002_create_pre_auth_keys::Migration),
            Box::new(m20260301_000003_create_nodes::Migration),
            Box::new(m20260301_000004_create_api_keys::Migration),
        ]
    }
}
