//! command line interface for wirescale.

mod apikeys;
mod namespaces;
mod nodes;
mod preauthkeys;
mod serve;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, bail};
use wirescale_db::WirescaleDb;
use wirescale_types::{Config, DatabaseConfig};

pub use apikeys::ApiKeysCommand;
pub use namespaces::NamespacesCommand;
pub use nodes::NodesCommand;
pub use preauthkeys::PreAuthKeysCommand;
pub use serve::ServeCommand;

/// wirescale - coordination server for a wireguard mesh overlay.
#[derive(Parser, Debug)]
#[command(name = "wirescale", version, about)]
pub struct Cli {
    /// the subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// run the coordination server
    Serve(ServeCommand),
    /// manage namespaces
    #[command(subcommand)]
    Namespaces(NamespacesCommand),
    /// manage pre-auth keys
    #[command(subcommand)]
    Preauthkeys(PreAuthKeysCommand),
    /// manage nodes
    #[command(subcommand)]
    Nodes(NodesCommand),
    /// manage admin api keys
    #[command(subcommand)]
    Apikeys(ApiKeysCommand),
}

/// turn a `sqlite://` / `postgres://` url into a database config.
pub(crate) fn database_config(url: &str) -> Result<DatabaseConfig> {
    if url.starts_with("postgres://") {
        Ok(DatabaseConfig {
            db_type: "postgres".to_string(),
            connection_string: url.to_string(),
        })
    } else if let Some(path) = url.strip_prefix("sqlite://") {
        Ok(DatabaseConfig {
            db_type: "sqlite".to_string(),
            connection_string: path.to_string(),
        })
    } else {
        bail!("database URL must start with sqlite:// or postgres://");
    }
}

/// open the database for an admin subcommand.
pub(crate) async fn open_db(database_url: &str) -> Result<WirescaleDb> {
    let config = Config {
        database: database_config(database_url)?,
        ..Default::default()
    };
    Ok(WirescaleDb::new(&config).await?)
}
