//! error type for database operations.

use thiserror::Error;

/// errors produced by the storage layer.
#[derive(Debug, Error)]
pub enum Error {
    /// could not connect to the database.
    #[error("database connection error: {0}")]
    Connection(String),

    /// a migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// a query failed.
    #[error("database error: {0}")]
    Query(#[from] sea_orm::DbErr),

    /// a stored value could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// both address pools are exhausted.
    #[error("no_addresses_available")]
    NoAddressesAvailable,
}
