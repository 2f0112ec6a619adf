//! wirescale - coordination server for a wireguard mesh overlay.
//!
//! an open replacement for a proprietary coordination server: nodes
//! register here, the server keeps the authoritative view of the overlay
//! and pushes network-map updates over long-lived http streams.

use clap::Parser;
use color_eyre::eyre::Result;
use wirescale::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(cmd) => cmd.run().await,
        Command::Namespaces(cmd) => cmd.run().await,
        Command::Preauthkeys(cmd) => cmd.run().await,
        Command::Nodes(cmd) => cmd.run().await,
        Command::Apikeys(cmd) => cmd.run().await,
    }
}
