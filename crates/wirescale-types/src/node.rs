//! node type representing a registered member of the overlay.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Duration, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::keys::{DiscoKey, MachineKey, NodeKey};
use crate::namespace::NamespaceId;

/// unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// convert to the stable id string used on the wire.
    pub fn stable_id(&self) -> String {
        self.0.to_string()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a registered overlay member.
///
/// a node is created by registration, mutated on every map request
/// (host info, endpoints, last_seen) and deleted by operator action or,
/// for ephemeral nodes, after disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// unique identifier.
    pub id: NodeId,

    /// machine key - identifies the physical device.
    pub machine_key: MachineKey,

    /// node key - identifies the current session (can rotate).
    pub node_key: NodeKey,

    /// disco key - used for peer path discovery.
    pub disco_key: DiscoKey,

    /// network endpoints the client last reported.
    pub endpoints: Vec<SocketAddr>,

    /// host information from the client.
    pub hostinfo: Option<HostInfo>,

    /// ipv4 address assigned to this node.
    pub ipv4: Option<IpAddr>,

    /// ipv6 address assigned to this node.
    pub ipv6: Option<IpAddr>,

    /// hostname reported by the client during registration.
    pub hostname: String,

    /// dns-safe name derived from the hostname.
    pub given_name: String,

    /// namespace this node belongs to.
    pub namespace_id: NamespaceId,

    /// how the node was registered (authkey, oidc, cli).
    pub register_method: RegisterMethod,

    /// pre-auth key id used to register this node.
    pub auth_key_id: Option<u64>,

    /// whether this is an ephemeral node (deleted after disconnect).
    pub ephemeral: bool,

    /// when the node registration expires.
    pub expiry: Option<DateTime<Utc>>,

    /// last time the node contacted the server.
    pub last_seen: Option<DateTime<Utc>>,

    /// last time a full map was successfully delivered to the node.
    ///
    /// compared against the global change epoch to decide whether a
    /// streaming session is behind. keep-alives never touch this.
    pub last_successful_update: Option<DateTime<Utc>>,

    /// advertised routes the operator has approved.
    pub enabled_routes: Vec<IpNet>,

    /// when the node was created.
    pub created_at: DateTime<Utc>,

    /// when the node was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// returns whether the node registration has expired.
    pub fn is_expired(&self) -> bool {
        match &self.expiry {
            None => false,
            Some(expiry) => Utc::now() > *expiry,
        }
    }

    /// returns whether the node was seen within the given window.
    pub fn seen_within(&self, window: Duration) -> bool {
        match &self.last_seen {
            None => false,
            Some(seen) => Utc::now() - *seen < window,
        }
    }

    /// returns whether the node has missed a state change.
    ///
    /// a node is outdated when it has never received a full map or when
    /// its last delivery predates the given change epoch.
    pub fn is_outdated(&self, last_state_change: DateTime<Utc>) -> bool {
        match &self.last_successful_update {
            None => true,
            Some(updated) => *updated < last_state_change,
        }
    }

    /// returns all ip addresses assigned to this node.
    pub fn ips(&self) -> Vec<IpAddr> {
        let mut ips = Vec::with_capacity(2);
        if let Some(ip) = self.ipv4 {
            ips.push(ip);
        }
        if let Some(ip) = self.ipv6 {
            ips.push(ip);
        }
        ips
    }

    /// returns the routes this node is currently advertising.
    pub fn advertised_routes(&self) -> &[IpNet] {
        self.hostinfo
            .as_ref()
            .map(|h| h.routable_ips.as_slice())
            .unwrap_or(&[])
    }

    /// returns the advertised routes the operator has enabled.
    ///
    /// the enabled set is always clamped to the advertised set at
    /// observation time.
    pub fn routes(&self) -> Vec<IpNet> {
        self.advertised_routes()
            .iter()
            .filter(|route| self.enabled_routes.contains(route))
            .cloned()
            .collect()
    }

    /// returns the tags this node is requesting via host info.
    pub fn requested_tags(&self) -> &[String] {
        self.hostinfo
            .as_ref()
            .map(|h| h.request_tags.as_slice())
            .unwrap_or(&[])
    }
}

/// host information reported by the client.
///
/// field names match the client's json encoding (pascalcase).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostInfo {
    /// client version (e.g., "1.22.2").
    #[serde(rename = "IPNVersion", default)]
    pub ipn_version: Option<String>,

    /// operating system (e.g., "linux", "windows", "darwin").
    #[serde(rename = "OS", default)]
    pub os: Option<String>,

    /// os version.
    #[serde(rename = "OSVersion", default)]
    pub os_version: Option<String>,

    /// device model.
    #[serde(default)]
    pub device_model: Option<String>,

    /// hostname of the device.
    #[serde(default)]
    pub hostname: Option<String>,

    /// whether the host blocks incoming connections.
    #[serde(default)]
    pub shields_up: bool,

    /// routes this node wants to advertise as a subnet router.
    #[serde(rename = "RoutableIPs", default)]
    pub routable_ips: Vec<IpNet>,

    /// tags the node is requesting (gated by the policy's tag owners).
    #[serde(default)]
    pub request_tags: Vec<String>,

    /// network information.
    #[serde(default)]
    pub net_info: Option<NetInfo>,
}

/// network information for a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetInfo {
    /// preferred relay region.
    #[serde(rename = "PreferredDERP", default)]
    pub preferred_derp: i32,

    /// latency to each relay region in seconds.
    #[serde(rename = "DERPLatency", default)]
    pub derp_latency: std::collections::HashMap<String, f64>,
}

/// how a node was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegisterMethod {
    /// registered via pre-authentication key.
    #[default]
    AuthKey,
    /// registered via oidc.
    Oidc,
    /// registered via the operator cli.
    Cli,
}

impl RegisterMethod {
    /// the string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterMethod::AuthKey => "authkey",
            RegisterMethod::Oidc => "oidc",
            RegisterMethod::Cli => "cli",
        }
    }

    /// parse the stored string form, defaulting to authkey.
    pub fn parse(s: &str) -> Self {
        match s {
            "oidc" => RegisterMethod::Oidc,
            "cli" => RegisterMethod::Cli,
            _ => RegisterMethod::AuthKey,
        }
    }
}
