//! configuration types for wirescale.

use std::path::PathBuf;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// default keep-alive interval for streaming map sessions, in seconds.
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 60;

/// default interval for the per-stream freshness check, in seconds.
pub const DEFAULT_UPDATE_CHECK_INTERVAL_SECS: u64 = 30;

/// main configuration for wirescale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// public server url (used in auth urls handed to clients).
    pub server_url: String,

    /// address to bind the http server to.
    pub listen_addr: String,

    /// path to the server's long-term private key file.
    pub private_key_path: PathBuf,

    /// ipv4 prefix for node address allocation.
    pub prefix_v4: Option<IpNet>,

    /// ipv6 prefix for node address allocation.
    pub prefix_v6: Option<IpNet>,

    /// base domain for overlay dns names.
    pub base_domain: String,

    /// database configuration.
    pub database: DatabaseConfig,

    /// dns configuration pushed to nodes.
    pub dns: DnsConfig,

    /// relay map configuration.
    pub derp: DerpConfig,

    /// oidc configuration (optional).
    pub oidc: Option<OidcConfig>,

    /// path to the acl policy file (permissive json).
    pub acl_policy_path: Option<PathBuf>,

    /// timer tuning.
    pub tuning: TuningConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            private_key_path: PathBuf::from("/var/lib/wirescale/private.key"),
            prefix_v4: Some("100.64.0.0/10".parse().unwrap()),
            prefix_v6: Some("fd7a:115c:a1e0::/48".parse().unwrap()),
            base_domain: "wirescale.net".to_string(),
            database: DatabaseConfig::default(),
            dns: DnsConfig::default(),
            derp: DerpConfig::default(),
            oidc: None,
            acl_policy_path: None,
            tuning: TuningConfig::default(),
        }
    }
}

/// database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// database type: "sqlite" or "postgres".
    pub db_type: String,

    /// database connection string or file path.
    pub connection_string: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            connection_string: "/var/lib/wirescale/db.sqlite".to_string(),
        }
    }
}

/// dns configuration pushed to nodes in map responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// enable overlay dns (nodes resolvable by name).
    pub magic_dns: bool,

    /// global nameservers pushed to nodes.
    pub nameservers: Vec<String>,

    /// extra search domains, in addition to per-namespace domains.
    pub search_domains: Vec<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            magic_dns: true,
            nameservers: vec![],
            search_domains: vec![],
        }
    }
}

/// relay map configuration. the map is served to nodes verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DerpConfig {
    /// path to a json relay map file.
    pub derp_map_path: Option<PathBuf>,

    /// fallback region served when no map file is configured.
    pub fallback_region_id: i32,

    /// hostname of the fallback region's relay.
    pub fallback_region_host: Option<String>,
}

/// oidc provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// issuer url for discovery.
    pub issuer: String,

    /// oauth2 client id.
    pub client_id: String,

    /// oauth2 client secret.
    pub client_secret: String,

    /// requested scopes.
    pub scope: Vec<String>,

    /// when non-empty, only these email domains may register.
    pub allowed_domains: Vec<String>,

    /// when non-empty, only these emails may register.
    pub allowed_users: Vec<String>,

    /// strip the email domain when deriving the namespace name
    /// (`u@ex.com` becomes `u` instead of `u.ex.com`).
    pub strip_email_domain: bool,

    /// extra query parameters for the authorize endpoint.
    pub extra_params: std::collections::HashMap<String, String>,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: vec!["openid".to_string(), "profile".to_string(), "email".to_string()],
            allowed_domains: vec![],
            allowed_users: vec![],
            strip_email_domain: false,
            extra_params: std::collections::HashMap::new(),
        }
    }
}

/// timer tuning for the long-poll engine and caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// keep-alive interval for streaming sessions (0 disables).
    pub keepalive_interval_secs: u64,

    /// freshness-check interval for streaming sessions.
    pub update_check_interval_secs: u64,

    /// ttl for pending registration cache entries.
    pub register_cache_ttl_secs: u64,

    /// how long an ephemeral node may stay disconnected before deletion.
    pub ephemeral_inactivity_secs: u64,

    /// how often the ephemeral collector runs.
    pub ephemeral_collect_interval_secs: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            update_check_interval_secs: DEFAULT_UPDATE_CHECK_INTERVAL_SECS,
            register_cache_ttl_secs: 15 * 60,
            ephemeral_inactivity_secs: 120,
            ephemeral_collect_interval_secs: 30,
        }
    }
}
