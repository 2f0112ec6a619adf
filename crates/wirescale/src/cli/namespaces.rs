//! namespace admin subcommands.

use clap::Subcommand;
use color_eyre::eyre::{Result, bail};
use wirescale_db::Database;
use wirescale_types::{Namespace, NamespaceId};

/// manage namespaces
#[derive(Subcommand, Debug)]
pub enum NamespacesCommand {
    /// create a namespace
    Create {
        /// namespace name (dns label rules)
        name: String,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// list namespaces
    List {
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// delete an empty namespace
    Destroy {
        /// namespace name
        name: String,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
}

impl NamespacesCommand {
    /// run the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            NamespacesCommand::Create { name, database_url } => {
                let db = super::open_db(&database_url).await?;
                let ns = Namespace::new(NamespaceId(0), name)?;
                if db.get_namespace_by_name(&ns.name).await?.is_some() {
                    bail!("namespace {} already exists", ns.name);
                }
                let created = db.create_namespace(&ns).await?;
                println!("created namespace {} (id {})", created.name, created.id);
                Ok(())
            }
            NamespacesCommand::List { database_url } => {
                let db = super::open_db(&database_url).await?;
                for ns in db.list_namespaces().await? {
                    let nodes = db.list_nodes_in_namespace(ns.id).await?;
                    println!("{}\t{}\t{} node(s)", ns.id, ns.name, nodes.len());
                }
                Ok(())
            }
            NamespacesCommand::Destroy { name, database_url } => {
                let db = super::open_db(&database_url).await?;
                let Some(ns) = db.get_namespace_by_name(&name).await? else {
                    bail!("namespace {name} not found");
                };
                if !db.list_nodes_in_namespace(ns.id).await?.is_empty() {
                    bail!("namespace {name} still has nodes");
                }
                db.delete_namespace(ns.id).await?;
                println!("destroyed namespace {name}");
                Ok(())
            }
        }
    }
}
