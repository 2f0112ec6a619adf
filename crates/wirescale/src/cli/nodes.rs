//! node admin subcommands.
//!
//! `register` talks to the running server's admin api because the
//! pending-registration cache lives in the server process; the other
//! subcommands operate on the database directly.

use clap::Subcommand;
use color_eyre::eyre::{Context, Result, bail};
use wirescale_db::Database;
use wirescale_types::NodeId;

/// manage nodes
#[derive(Subcommand, Debug)]
pub enum NodesCommand {
    /// list registered nodes
    List {
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// complete a pending registration from its pairing token
    Register {
        /// pairing token from the registration page
        #[arg(long)]
        token: String,
        /// namespace to bind the machine to
        #[arg(long)]
        namespace: String,
        /// server admin api url
        #[arg(
            long,
            default_value = "http://127.0.0.1:8080",
            env = "WIRESCALE_SERVER_URL"
        )]
        server_url: String,
        /// admin api key (prefix.secret)
        #[arg(long, env = "WIRESCALE_API_KEY")]
        api_key: String,
    },
    /// delete a node
    Delete {
        /// node id
        id: u64,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// expire a node's registration now
    Expire {
        /// node id
        id: u64,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
}

impl NodesCommand {
    /// run the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            NodesCommand::List { database_url } => {
                let db = super::open_db(&database_url).await?;
                for node in db.list_nodes().await? {
                    println!(
                        "{}\t{}\t{}\t{}\tns={}\tlast_seen={}",
                        node.id,
                        node.given_name,
                        node.ipv4.map(|ip| ip.to_string()).unwrap_or_default(),
                        node.ipv6.map(|ip| ip.to_string()).unwrap_or_default(),
                        node.namespace_id,
                        node.last_seen
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string()),
                    );
                }
                Ok(())
            }
            NodesCommand::Register {
                token,
                namespace,
                server_url,
                api_key,
            } => {
                let url = format!(
                    "{}/api/v1/node/register",
                    server_url.trim_end_matches('/')
                );
                let client = reqwest::Client::new();
                let response = client
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&serde_json::json!({"token": token, "namespace": namespace}))
                    .send()
                    .await
                    .context("could not reach the server admin api")?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("registration failed: {status}: {body}");
                }
                let node: serde_json::Value = response.json().await?;
                println!(
                    "registered node {} in namespace {namespace}",
                    node.get("given_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("?")
                );
                Ok(())
            }
            NodesCommand::Delete { id, database_url } => {
                let db = super::open_db(&database_url).await?;
                let Some(node) = db.get_node(NodeId(id)).await? else {
                    bail!("node {id} not found");
                };
                db.delete_node(node.id).await?;
                println!("deleted node {} ({})", node.id, node.given_name);
                Ok(())
            }
            NodesCommand::Expire { id, database_url } => {
                let db = super::open_db(&database_url).await?;
                let Some(node) = db.get_node(NodeId(id)).await? else {
                    bail!("node {id} not found");
                };
                db.expire_node(node.id, Some(chrono::Utc::now())).await?;
                println!("expired node {} ({})", node.id, node.given_name);
                Ok(())
            }
        }
    }
}
