//! the `serve` subcommand - runs the coordination server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use wirescale_db::{Database, WirescaleDb};
use wirescale_policy::AclPolicy;
use wirescale_types::{Config, OidcConfig};

use crate::{AppState, OidcProvider, create_app, load_or_generate_keypair};

/// run the wirescale coordination server
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// database url (sqlite:// or postgres://)
    #[arg(long, env = "WIRESCALE_DATABASE_URL")]
    database_url: Option<String>,

    /// address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "WIRESCALE_LISTEN_ADDR")]
    listen_addr: String,

    /// public server url (for auth urls handed to clients)
    #[arg(
        long,
        default_value = "http://127.0.0.1:8080",
        env = "WIRESCALE_SERVER_URL"
    )]
    server_url: String,

    /// path to the server private key
    #[arg(
        long,
        default_value = "/var/lib/wirescale/private.key",
        env = "WIRESCALE_PRIVATE_KEY"
    )]
    private_key_path: PathBuf,

    /// base domain for overlay dns
    #[arg(long, default_value = "wirescale.net", env = "WIRESCALE_BASE_DOMAIN")]
    base_domain: String,

    /// ipv4 prefix (cidr)
    #[arg(long, default_value = "100.64.0.0/10", env = "WIRESCALE_PREFIX_V4")]
    prefix_v4: String,

    /// ipv6 prefix (cidr)
    #[arg(
        long,
        default_value = "fd7a:115c:a1e0::/48",
        env = "WIRESCALE_PREFIX_V6"
    )]
    prefix_v6: String,

    /// path to the acl policy file (permissive json)
    #[arg(long, env = "WIRESCALE_ACL_POLICY")]
    acl_policy_path: Option<PathBuf>,

    /// path to a relay map file (json)
    #[arg(long, env = "WIRESCALE_DERP_MAP")]
    derp_map_path: Option<PathBuf>,

    /// oidc issuer url
    #[arg(long, env = "WIRESCALE_OIDC_ISSUER")]
    oidc_issuer: Option<String>,

    /// oidc client id
    #[arg(long, env = "WIRESCALE_OIDC_CLIENT_ID")]
    oidc_client_id: Option<String>,

    /// oidc client secret
    #[arg(long, env = "WIRESCALE_OIDC_CLIENT_SECRET")]
    oidc_client_secret: Option<String>,

    /// strip the email domain when deriving namespace names
    #[arg(long, default_value_t = false, env = "WIRESCALE_OIDC_STRIP_EMAIL_DOMAIN")]
    oidc_strip_email_domain: bool,

    /// log level
    #[arg(long, default_value = "info", env = "WIRESCALE_LOG_LEVEL")]
    log_level: String,
}

impl ServeCommand {
    /// convert cli arguments into a config struct.
    fn into_config(self) -> Result<Config> {
        let database = match &self.database_url {
            Some(url) => super::database_config(url)?,
            None => Default::default(),
        };

        let oidc = match (&self.oidc_issuer, &self.oidc_client_id, &self.oidc_client_secret) {
            (Some(issuer), Some(client_id), Some(client_secret)) => Some(OidcConfig {
                issuer: issuer.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                strip_email_domain: self.oidc_strip_email_domain,
                ..Default::default()
            }),
            (None, None, None) => None,
            _ => {
                color_eyre::eyre::bail!(
                    "oidc requires issuer, client id and client secret together"
                );
            }
        };

        let mut config = Config {
            listen_addr: self.listen_addr,
            server_url: self.server_url,
            private_key_path: self.private_key_path,
            base_domain: self.base_domain,
            prefix_v4: Some(self.prefix_v4.parse().context("invalid IPv4 prefix")?),
            prefix_v6: Some(self.prefix_v6.parse().context("invalid IPv6 prefix")?),
            database,
            oidc,
            acl_policy_path: self.acl_policy_path,
            ..Default::default()
        };
        config.derp.derp_map_path = self.derp_map_path;

        Ok(config)
    }

    /// run the serve command.
    pub async fn run(self) -> Result<()> {
        let log_level = match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
        tracing::subscriber::set_global_default(subscriber)?;

        info!("starting wirescale...");

        let config = self.into_config()?;
        info!("Database: {}", config.database.connection_string);
        info!("Listen address: {}", config.listen_addr);
        info!("Server url: {}", config.server_url);

        // ensure parent directory exists for sqlite databases
        if config.database.db_type == "sqlite" {
            let db_path = std::path::Path::new(&config.database.connection_string);
            if let Some(parent) = db_path.parent()
                && !parent.exists()
            {
                info!("Creating database directory: {:?}", parent);
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create database directory: {:?}", parent))?;
            }
        }

        let db = WirescaleDb::new(&config)
            .await
            .context("failed to initialize database")?;
        info!("Database initialized");

        let policy = match &config.acl_policy_path {
            Some(path) => {
                info!("Loading acl policy from {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read policy file: {:?}", path))?;
                AclPolicy::parse(&contents).context("failed to parse policy file")?
            }
            None => {
                warn!("no acl policy file provided, nodes only see their own namespace");
                AclPolicy::default()
            }
        };

        let keypair = load_or_generate_keypair(&config.private_key_path)
            .await
            .with_context(|| {
                format!("failed to load/generate keypair: {:?}", config.private_key_path)
            })?;
        info!(public_key = %keypair.public_hex(), "server keypair loaded");

        let oidc = match &config.oidc {
            Some(oidc_config) => {
                info!(issuer = %oidc_config.issuer, "configuring oidc provider");
                Some(
                    OidcProvider::new(oidc_config.clone(), &config.server_url)
                        .await
                        .map_err(|e| color_eyre::eyre::eyre!(e))?,
                )
            }
            None => None,
        };

        let state = AppState::new(db, config.clone(), policy, keypair, oidc).await?;

        // background tasks: ephemeral collector and policy reload on sighup
        spawn_ephemeral_collector(&state);
        spawn_policy_reload(&state);

        let app = create_app(state);

        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("invalid listen address")?;
        info!("starting http server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app).await.context("server error")?;

        Ok(())
    }
}

/// spawn the ephemeral node collector; deletions notify streaming peers.
fn spawn_ephemeral_collector(state: &AppState) {
    let interval =
        std::time::Duration::from_secs(state.config.tuning.ephemeral_collect_interval_secs.max(1));
    let notify_state = state.clone();
    state.ephemeral_gc.clone().spawn_collector(interval, move |deleted| {
        let state = notify_state.clone();
        tokio::spawn(async move {
            info!(count = deleted.len(), "ephemeral nodes collected");
            state.state_updated(None).await;
        });
    });
}

/// reload the acl policy on sighup, keeping the old rules on failure.
fn spawn_policy_reload(state: &AppState) {
    #[cfg(unix)]
    {
        let state = state.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut hangups = match signal(SignalKind::hangup()) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "could not install SIGHUP handler");
                    return;
                }
            };

            while hangups.recv().await.is_some() {
                let Some(path) = state.config.acl_policy_path.clone() else {
                    warn!("SIGHUP received but no policy file is configured");
                    continue;
                };
                info!(?path, "reloading acl policy");

                let parsed = std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|contents| {
                        AclPolicy::parse(&contents).map_err(|e| e.to_string())
                    });
                let policy = match parsed {
                    Ok(policy) => policy,
                    Err(e) => {
                        warn!(error = %e, "policy reload failed, keeping previous rules");
                        continue;
                    }
                };

                let (namespaces, nodes) = match (
                    state.db.list_namespaces().await,
                    state.db.list_nodes().await,
                ) {
                    (Ok(namespaces), Ok(nodes)) => (namespaces, nodes),
                    _ => {
                        warn!("could not load state for policy reload");
                        continue;
                    }
                };

                match state.acl.replace_policy(policy, &namespaces, &nodes) {
                    Ok(()) => {
                        info!("acl policy reloaded");
                        state.state_updated(None).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "policy did not compile, keeping previous rules");
                    }
                }
            }
        });
    }
    #[cfg(not(unix))]
    {
        let _ = state;
    }
}
