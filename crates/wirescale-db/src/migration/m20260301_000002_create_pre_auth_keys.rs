//! create pre_auth_keys table migration

use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_namespaces::Namespaces;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PreAuthKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PreAuthKeys::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PreAuthKeys::KeyPrefix).string().not_null())
                    .col(ColumnDef::new(PreAuthKeys::KeyHash).string().not_null())
                    .col(
                        ColumnDef::new(PreAuthKeys::NamespaceId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PreAuthKeys::Reusable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PreAuthKeys::Ephemeral)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PreAuthKeys::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(PreAuthKeys::Expiration).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(PreAuthKeys::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PreAuthKeys::DeletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pre_auth_keys_namespace")
                            .from(PreAuthKeys::Table, PreAuthKeys::NamespaceId)
                            .to(Namespaces::Table, Namespaces::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // prefix lookup during registration
        manager
            .create_index(
                Index::create()
                    .name("idx_pre_auth_keys_key_prefix")
                    .table(PreAuthKeys::Table)
                    .col(PreAuthKeys::KeyPrefix)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PreAuthKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PreAuthKeys {
    Table,
    Id,
    KeyPrefix,
    KeyHash,
    NamespaceId,
    Reusable,
    Ephemeral,
    Used,
    Expiration,
    CreatedAt,
    DeletedAt,
}
