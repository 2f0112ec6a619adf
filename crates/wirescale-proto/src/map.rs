//! map request/response types for `/machine/:mkey/map`.
//!
//! these are the messages exchanged on the long-poll channel that keeps
//! every node's view of the overlay current.

use serde::{Deserialize, Serialize};

use wirescale_types::{DiscoKey, HostInfo, MachineKey, NodeKey};

/// a map request from a node.
///
/// the same message starts a one-shot fetch (`stream: false`), a bootstrap
/// fetch (`read_only: true`) or a streaming session (`stream: true`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapRequest {
    /// client capability version.
    #[serde(default)]
    pub version: u64,

    /// client's current node key.
    pub node_key: NodeKey,

    /// client's disco key.
    #[serde(default)]
    pub disco_key: Option<DiscoKey>,

    /// client's current endpoints.
    #[serde(default)]
    pub endpoints: Vec<std::net::SocketAddr>,

    /// client's host information.
    #[serde(default)]
    pub hostinfo: Option<HostInfo>,

    /// the client only wants the map and no server-side state updates.
    /// used at start-up to discover the relay map.
    #[serde(default)]
    pub read_only: bool,

    /// omit peers in the response (lightweight endpoint update).
    #[serde(default)]
    pub omit_peers: bool,

    /// keep the connection open and push updates.
    #[serde(default)]
    pub stream: bool,
}

/// a map response sent to a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapResponse {
    /// when true this frame is only a liveness signal; all other fields
    /// are empty and the client skips processing.
    #[serde(default)]
    pub keep_alive: bool,

    /// the node's own block.
    pub node: Option<MapNode>,

    /// peers visible to the node.
    #[serde(default)]
    pub peers: Vec<MapNode>,

    /// dns configuration.
    #[serde(rename = "DNSConfig", default)]
    pub dns_config: Option<DnsConfig>,

    /// relay map, verbatim from server config.
    #[serde(rename = "DERPMap", default)]
    pub derp_map: Option<DerpMap>,

    /// compiled packet filter rules.
    #[serde(default)]
    pub packet_filter: Vec<FilterRule>,

    /// profiles for the namespaces appearing in peers.
    #[serde(default)]
    pub user_profiles: Vec<UserProfile>,

    /// overlay dns domain.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    /// server time when the response was assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_time: Option<String>,
}

impl MapResponse {
    /// create the keep-alive variant: no peers, no dns, no relay map.
    pub fn keepalive() -> Self {
        Self {
            keep_alive: true,
            ..Default::default()
        }
    }
}

/// a node as rendered in a map response (self block or peer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapNode {
    /// numeric node id.
    #[serde(rename = "ID")]
    pub id: u64,

    /// stable string id.
    #[serde(rename = "StableID")]
    pub stable_id: String,

    /// overlay dns name.
    pub name: String,

    /// owning namespace id.
    pub user: u64,

    /// current node key.
    pub key: NodeKey,

    /// when the node key expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_expiry: Option<String>,

    /// machine key.
    pub machine: MachineKey,

    /// disco key.
    #[serde(default, skip_serializing_if = "DiscoKey::is_empty")]
    pub disco_key: DiscoKey,

    /// assigned overlay addresses in cidr notation.
    pub addresses: Vec<String>,

    /// addresses plus enabled subnet routes.
    #[serde(rename = "AllowedIPs")]
    pub allowed_ips: Vec<String>,

    /// endpoint candidates.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// host information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostinfo: Option<HostInfo>,

    /// when the node was created.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,

    /// last time the node contacted the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    /// whether the node was seen recently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// peers carry keep_alive=true.
    #[serde(default)]
    pub keep_alive: bool,

    /// whether the machine is authorized on the overlay.
    pub machine_authorized: bool,
}

/// dns configuration pushed to nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DnsConfig {
    /// nameservers to use.
    #[serde(default)]
    pub nameservers: Vec<String>,

    /// search domains.
    #[serde(default)]
    pub domains: Vec<String>,

    /// whether overlay names are resolved by the coordination server
    /// (overlay dns enabled).
    #[serde(default)]
    pub proxied: bool,
}

/// relay map served verbatim from server config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerpMap {
    /// relay regions keyed by id.
    pub regions: std::collections::HashMap<i32, DerpRegion>,
}

/// a relay region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerpRegion {
    /// region id.
    #[serde(rename = "RegionID")]
    pub region_id: i32,

    /// short region code.
    #[serde(default)]
    pub region_code: String,

    /// human-readable region name.
    #[serde(default)]
    pub region_name: String,

    /// relay servers in this region.
    #[serde(default)]
    pub nodes: Vec<DerpNode>,
}

/// a relay server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerpNode {
    /// node name.
    pub name: String,

    /// region this node belongs to.
    #[serde(rename = "RegionID")]
    pub region_id: i32,

    /// hostname clients connect to.
    pub host_name: String,

    /// ipv4 address override.
    #[serde(rename = "IPv4", default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,

    /// ipv6 address override.
    #[serde(rename = "IPv6", default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,

    /// stun port (0 means the default).
    #[serde(rename = "STUNPort", default)]
    pub stun_port: i32,

    /// whether this node only serves stun.
    #[serde(rename = "STUNOnly", default)]
    pub stun_only: bool,

    /// relay port (0 means 443).
    #[serde(rename = "DERPPort", default)]
    pub derp_port: i32,
}

/// a compiled packet filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterRule {
    /// source ip set ("*", ip literals, cidrs).
    #[serde(rename = "SrcIPs")]
    pub src_ips: Vec<String>,

    /// destination ip/port ranges.
    pub dst_ports: Vec<NetPortRange>,
}

/// a destination ip with a port range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetPortRange {
    /// destination ip, cidr or "*".
    #[serde(rename = "IP")]
    pub ip: String,

    /// port range.
    pub ports: PortRange,
}

/// an inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortRange {
    /// first port in the range.
    pub first: u16,

    /// last port in the range.
    pub last: u16,
}

impl PortRange {
    /// the full 0-65535 range.
    pub const ALL: PortRange = PortRange {
        first: 0,
        last: 65535,
    };
}

/// a namespace profile for display in clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    /// namespace id.
    #[serde(rename = "ID")]
    pub id: u64,

    /// login name.
    pub login_name: String,

    /// display name.
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_request_flags_default_false() {
        let json = r#"{
            "NodeKey": "0303030303030303030303030303030303030303030303030303030303030303"
        }"#;
        let req: MapRequest = serde_json::from_str(json).unwrap();
        assert!(!req.read_only);
        assert!(!req.omit_peers);
        assert!(!req.stream);
    }

    #[test]
    fn test_map_request_streaming() {
        let json = r#"{
            "NodeKey": "0303030303030303030303030303030303030303030303030303030303030303",
            "Stream": true,
            "Endpoints": ["192.0.2.1:41641"]
        }"#;
        let req: MapRequest = serde_json::from_str(json).unwrap();
        assert!(req.stream);
        assert_eq!(req.endpoints.len(), 1);
    }

    #[test]
    fn test_keepalive_is_bare() {
        let resp = MapResponse::keepalive();
        assert!(resp.keep_alive);
        assert!(resp.node.is_none());
        assert!(resp.peers.is_empty());
        assert!(resp.derp_map.is_none());
        assert!(resp.dns_config.is_none());
    }

    #[test]
    fn test_port_range_all() {
        assert_eq!(PortRange::ALL.first, 0);
        assert_eq!(PortRange::ALL.last, 65535);
    }

    #[test]
    fn test_derp_map_wire_names() {
        let map = DerpMap {
            regions: [(
                1,
                DerpRegion {
                    region_id: 1,
                    region_code: "lhr".to_string(),
                    region_name: "London".to_string(),
                    nodes: vec![DerpNode {
                        name: "1a".to_string(),
                        region_id: 1,
                        host_name: "derp.example.com".to_string(),
                        ..Default::default()
                    }],
                },
            )]
            .into(),
        };
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"RegionID\":1"));
        assert!(json.contains("\"HostName\":\"derp.example.com\""));
    }

    #[test]
    fn test_filter_rule_wire_names() {
        let rule = FilterRule {
            src_ips: vec!["100.64.0.1".to_string()],
            dst_ports: vec![NetPortRange {
                ip: "*".to_string(),
                ports: PortRange { first: 22, last: 22 },
            }],
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"SrcIPs\""));
        assert!(json.contains("\"DstPorts\""));
        assert!(json.contains("\"IP\":\"*\""));
    }
}
