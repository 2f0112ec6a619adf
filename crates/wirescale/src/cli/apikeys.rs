//! admin api key subcommands.

use chrono::{Duration, Utc};
use clap::Subcommand;
use color_eyre::eyre::{Result, bail};
use wirescale_db::Database;
use wirescale_types::ApiKey;

/// manage admin api keys
#[derive(Subcommand, Debug)]
pub enum ApiKeysCommand {
    /// create an api key; the secret is printed exactly once
    Create {
        /// expire the key after this many days
        #[arg(long, default_value_t = 90)]
        expire_days: i64,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// list api keys
    List {
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
    /// expire an api key by prefix
    Expire {
        /// key prefix
        prefix: String,
        /// database url
        #[arg(long, env = "WIRESCALE_DATABASE_URL")]
        database_url: String,
    },
}

impl ApiKeysCommand {
    /// run the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            ApiKeysCommand::Create {
                expire_days,
                database_url,
            } => {
                let db = super::open_db(&database_url).await?;
                let expiration = Some(Utc::now() + Duration::days(expire_days));
                let (key, full) = ApiKey::generate(0, expiration)?;
                db.create_api_key(&key).await?;
                println!("{full}");
                Ok(())
            }
            ApiKeysCommand::List { database_url } => {
                let db = super::open_db(&database_url).await?;
                for key in db.list_api_keys().await? {
                    println!(
                        "{}\t{}...\texpired={}\tlast_seen={}",
                        key.id,
                        key.prefix,
                        key.is_expired(),
                        key.last_seen
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string()),
                    );
                }
                Ok(())
            }
            ApiKeysCommand::Expire {
                prefix,
                database_url,
            } => {
                let db = super::open_db(&database_url).await?;
                let Some(key) = db.get_api_key_by_prefix(&prefix).await? else {
                    bail!("api key {prefix} not found");
                };
                db.expire_api_key(key.id).await?;
                println!("expired api key {prefix}");
                Ok(())
            }
        }
    }
}
