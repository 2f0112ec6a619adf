//! wirescale library - application state, router and server plumbing.

pub mod acl;
pub mod broadcaster;
pub mod cli;
mod derp;
pub mod ephemeral;
pub mod handlers;
pub mod map_builder;
pub mod oidc;
pub mod reg_cache;
pub mod registration;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, Result};
use tokio::sync::Mutex;
use tracing::warn;
use wirescale_db::{Database, IpAllocator, WirescaleDb};
use wirescale_policy::AclPolicy;
use wirescale_proto::{DerpMap, ServerKeypair};
use wirescale_types::{Config, Node, NodeId};

pub use acl::AclState;
pub use broadcaster::ChangeBroadcaster;
pub use ephemeral::EphemeralGc;
pub use oidc::OidcProvider;
use reg_cache::{OidcState, PendingRegistration, RegistrationCache};

/// application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// persistent store.
    pub db: WirescaleDb,
    /// server configuration.
    pub config: Config,
    /// server long-term keypair for the nacl-box codec.
    pub keypair: ServerKeypair,
    /// change epoch + per-node update channels.
    pub broadcaster: ChangeBroadcaster,
    /// compiled acl policy snapshot.
    pub acl: AclState,
    /// overlay address allocator; its mutex is also the registration
    /// single-writer lock.
    pub ip_allocator: Arc<Mutex<IpAllocator>>,
    /// relay map served verbatim in map responses.
    pub derp_map: Arc<DerpMap>,
    /// ephemeral node collector.
    pub ephemeral_gc: EphemeralGc,
    /// pending interactive registrations, keyed by pairing token.
    pub pending_registrations: RegistrationCache<Arc<PendingRegistration>>,
    /// machine-key-hex -> pairing token index into the pending cache.
    pub pending_by_machine: RegistrationCache<String>,
    /// oidc state tokens awaiting their callback.
    pub oidc_states: RegistrationCache<OidcState>,
    /// oidc provider, when configured.
    pub oidc: Option<Arc<OidcProvider>>,
}

impl AppState {
    /// assemble application state from its parts.
    pub async fn new(
        db: WirescaleDb,
        config: Config,
        policy: AclPolicy,
        keypair: ServerKeypair,
        oidc: Option<OidcProvider>,
    ) -> Result<Self> {
        let mut allocator = IpAllocator::new(config.prefix_v4, config.prefix_v6);
        allocator.load_allocated(
            db.allocated_ips()
                .await
                .wrap_err("failed to load allocated addresses")?,
        );
        let ip_allocator = Arc::new(Mutex::new(allocator));

        let derp_map = derp::load_derp_map(&config.derp).wrap_err("failed to load relay map")?;

        // the policy is installed even when it does not compile against the
        // current node set (a namespace it names may simply not exist yet);
        // recompiles on later mutations pick it up
        let acl = AclState::new(policy);
        {
            let namespaces = db.list_namespaces().await?;
            let nodes = db.list_nodes().await?;
            acl.recompile(&namespaces, &nodes);
        }

        let cache_ttl = Duration::from_secs(config.tuning.register_cache_ttl_secs);
        let ephemeral_gc = EphemeralGc::new(
            db.clone(),
            ip_allocator.clone(),
            config.tuning.ephemeral_inactivity_secs,
        );

        Ok(Self {
            db,
            config,
            keypair,
            broadcaster: ChangeBroadcaster::new(),
            acl,
            ip_allocator,
            derp_map: Arc::new(derp_map),
            ephemeral_gc,
            pending_registrations: RegistrationCache::new(cache_ttl),
            pending_by_machine: RegistrationCache::new(cache_ttl),
            oidc_states: RegistrationCache::new(cache_ttl),
            oidc: oidc.map(Arc::new),
        })
    }

    /// record a state mutation: advance the change epoch, refresh the
    /// compiled filter rules and wake the affected streaming sessions.
    ///
    /// when `changed` names a node, the wakeup set is that node plus its
    /// peers (namespace members and acl-exposed nodes); otherwise every
    /// connected session is woken.
    pub async fn state_updated(&self, changed: Option<&Node>) {
        self.broadcaster.advance();

        let (namespaces, nodes) = match (self.db.list_namespaces().await, self.db.list_nodes().await)
        {
            (Ok(namespaces), Ok(nodes)) => (namespaces, nodes),
            _ => {
                warn!("could not load state for fan-out, sessions catch up on their next tick");
                return;
            }
        };
        self.acl.recompile(&namespaces, &nodes);

        let targets: Vec<NodeId> = match changed {
            Some(node) => {
                let rules = self.acl.rules();
                let mut ids: Vec<NodeId> = map_builder::peers_of(node, &nodes, &rules)
                    .iter()
                    .map(|n| n.id)
                    .collect();
                ids.push(node.id);
                ids
            }
            None => nodes.iter().map(|n| n.id).collect(),
        };
        self.broadcaster.signal_many(&targets).await;
    }
}

/// create the axum application with all routes.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/key", get(handlers::key))
        .route("/machine/{mkey}/register", post(handlers::register))
        .route("/machine/{mkey}/map", post(handlers::map))
        .route("/register/{token}", get(handlers::register_web))
        .route("/oidc/register/{mkey}", get(handlers::oidc_register))
        .route("/oidc/callback", get(handlers::oidc_callback))
        .nest("/api/v1", handlers::api_v1::router())
        .with_state(state)
}

/// load the server keypair from disk, generating one on first start.
pub async fn load_or_generate_keypair(path: &Path) -> std::io::Result<ServerKeypair> {
    if path.exists() {
        let contents = tokio::fs::read_to_string(path).await?;
        let bytes = hex::decode(contents.trim()).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("bad key file: {e}"))
        })?;
        return ServerKeypair::from_secret_bytes(&bytes).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("bad key file: {e}"))
        });
    }

    let keypair = ServerKeypair::generate();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, hex::encode(keypair.secret_bytes())).await?;
    Ok(keypair)
}
