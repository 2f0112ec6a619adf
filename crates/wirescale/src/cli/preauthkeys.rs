//! pre-auth key admin subcommands.

use chrono::{Duration, Utc};
use clap::Subcommand;
use color_eyre::eyre::{Result, bail};
use wirescale_db::Database;
use wirescale_types::{AuthKeyToken, PreAuthKey};

/// manage pre-auth keys
#[derive(Subcommand, Debug)]
pub enum PreAuthKeysCommand {
    /// create a pre-auth key; the secret is printed exactly once
    Create {
        /// namespace the key registers nodes into
        #[arg(long)]
        namespace: String,
        /// allow the key to register multiple nodes
        #[arg(long, default_value_t = false)]
        reusable: bool,
        /// nodes registered with the key are deleted after disconnect
        #[arg(long, default_value_t = false)]
        ephemeral: bool,
        /// expire the key after this many hours
        #[arg(long)]
        expire_hours: Option<i64>,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// list pre-auth keys in a namespace
    List {
        /// namespace to list
        #[arg(long)]
        namespace: String,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// expire a pre-auth key by prefix
    Expire {
        /// key prefix
        prefix: String,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
}

impl PreAuthKeysCommand {
    /// run the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            PreAuthKeysCommand::Create {
                namespace,
                reusable,
                ephemeral,
                expire_hours,
                database_url,
            } => {
                let db = super::open_db(&database_url).await?;
                let Some(ns) = db.get_namespace_by_name(&namespace).await? else {
                    bail!("namespace {namespace} not found");
                };

                let token = AuthKeyToken::generate();
                let mut key = PreAuthKey::from_token(0, &token, ns.id);
                key.reusable = reusable;
                key.ephemeral = ephemeral;
                key.expiration = expire_hours.map(|h| Utc::now() + Duration::hours(h));
                db.create_preauth_key(&key).await?;

                println!("{token}");
                Ok(())
            }
            PreAuthKeysCommand::List {
                namespace,
                database_url,
            } => {
                let db = super::open_db(&database_url).await?;
                let Some(ns) = db.get_namespace_by_name(&namespace).await? else {
                    bail!("namespace {namespace} not found");
                };
                for key in db.list_preauth_keys(ns.id).await? {
                    println!(
                        "{}\t{}...\treusable={}\tephemeral={}\tused={}\tvalid={}",
                        key.id,
                        key.key_prefix,
                        key.reusable,
                        key.ephemeral,
                        key.used,
                        key.is_valid()
                    );
                }
                Ok(())
            }
            PreAuthKeysCommand::Expire {
                prefix,
                database_url,
            } => {
                let db = super::open_db(&database_url).await?;
                let Some(key) = db.get_preauth_key_by_prefix(&prefix).await? else {
                    bail!("pre-auth key {prefix} not found");
                };
                db.expire_preauth_key(key.id).await?;
                println!("expired pre-auth key {prefix}");
                Ok(())
            }
        }
    }
}
