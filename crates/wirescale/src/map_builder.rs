//! map assembler: builds the per-node map response.
//!
//! a node's peers are the other unexpired nodes that either share its
//! namespace or are exposed to it by the compiled filter rules. the full
//! rule list rides along in every map so the client can enforce it.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use chrono::{Duration, Utc};
use ipnet::IpNet;
use wirescale_db::Database;
use wirescale_proto::{DnsConfig, FilterRule, MapNode, MapResponse, UserProfile};
use wirescale_types::{Namespace, Node};

use crate::AppState;

/// a peer is rendered online when it was seen within this window.
const ONLINE_WINDOW_MINUTES: i64 = 5;

/// whether a filter entry ("*", ip or cidr) covers any of the given ips.
fn entry_matches(entry: &str, ips: &[IpAddr]) -> bool {
    if entry == "*" {
        return true;
    }
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return ips.contains(&ip);
    }
    if let Ok(net) = entry.parse::<IpNet>() {
        return ips.iter().any(|ip| net.contains(ip));
    }
    false
}

/// whether a rule mentions any of the given ips, as source or destination.
fn rule_mentions(rule: &FilterRule, ips: &[IpAddr]) -> bool {
    rule.src_ips.iter().any(|src| entry_matches(src, ips))
        || rule.dst_ports.iter().any(|dst| entry_matches(&dst.ip, ips))
}

/// compute the peers visible to a node.
///
/// a peer qualifies when it shares the node's namespace, or when it
/// appears (as source or destination) in a rule that mentions any of the
/// node's ips. expired peers are omitted.
pub fn peers_of<'a>(node: &Node, all_nodes: &'a [Node], rules: &[FilterRule]) -> Vec<&'a Node> {
    let node_ips = node.ips();
    let mentioning: Vec<&FilterRule> = rules
        .iter()
        .filter(|rule| rule_mentions(rule, &node_ips))
        .collect();

    let mut peers: Vec<&Node> = all_nodes
        .iter()
        .filter(|candidate| candidate.id != node.id)
        .filter(|candidate| !candidate.is_expired())
        .filter(|candidate| {
            if candidate.namespace_id == node.namespace_id {
                return true;
            }
            let candidate_ips = candidate.ips();
            mentioning
                .iter()
                .any(|rule| rule_mentions(rule, &candidate_ips))
        })
        .collect();
    peers.sort_by_key(|n| n.id);
    peers
}

/// render a node into its map form.
pub fn build_map_node(node: &Node, peer: bool) -> MapNode {
    let addresses: Vec<String> = node
        .ips()
        .into_iter()
        .map(|ip| match ip {
            IpAddr::V4(v4) => ipnet::Ipv4Net::from(v4).to_string(),
            IpAddr::V6(v6) => ipnet::Ipv6Net::from(v6).to_string(),
        })
        .collect();

    let mut allowed_ips = addresses.clone();
    allowed_ips.extend(node.routes().iter().map(|r| r.to_string()));

    let online = if peer {
        Some(node.seen_within(Duration::minutes(ONLINE_WINDOW_MINUTES)))
    } else {
        // the node asking for the map is here by definition
        Some(true)
    };

    MapNode {
        id: node.id.0,
        stable_id: node.id.stable_id(),
        name: node.given_name.clone(),
        user: node.namespace_id.0,
        key: node.node_key.clone(),
        key_expiry: node.expiry.map(|e| e.to_rfc3339()),
        machine: node.machine_key.clone(),
        disco_key: node.disco_key.clone(),
        addresses,
        allowed_ips,
        endpoints: node.endpoints.iter().map(|e| e.to_string()).collect(),
        hostinfo: node.hostinfo.clone(),
        created: node.created_at.to_rfc3339(),
        last_seen: node.last_seen.map(|t| t.to_rfc3339()),
        online,
        keep_alive: peer,
        machine_authorized: true,
    }
}

/// assemble the dns config for a node: configured nameservers plus the
/// overlay search domains for every namespace the node can see.
fn build_dns_config(
    state: &AppState,
    node: &Node,
    peers: &[&Node],
    namespaces: &HashMap<u64, &Namespace>,
) -> DnsConfig {
    let dns = &state.config.dns;
    let mut domains = dns.search_domains.clone();

    if dns.magic_dns {
        let mut namespace_ids: BTreeSet<u64> = BTreeSet::new();
        namespace_ids.insert(node.namespace_id.0);
        for peer in peers {
            namespace_ids.insert(peer.namespace_id.0);
        }
        for id in namespace_ids {
            if let Some(ns) = namespaces.get(&id) {
                domains.push(format!("{}.{}", ns.name, state.config.base_domain));
            }
        }
    }

    DnsConfig {
        nameservers: dns.nameservers.clone(),
        domains,
        proxied: dns.magic_dns,
    }
}

/// build the full map response for a node.
///
/// when `omit_peers` is set the peer list, filter and profiles are left
/// out; the relay map and dns config still ship so the client can
/// bootstrap.
pub async fn build_map_response(
    state: &AppState,
    node: &Node,
    omit_peers: bool,
) -> Result<MapResponse, wirescale_db::Error> {
    let all_nodes = state.db.list_nodes().await?;
    let namespace_list = state.db.list_namespaces().await?;
    let namespaces: HashMap<u64, &Namespace> =
        namespace_list.iter().map(|ns| (ns.id.0, ns)).collect();

    let rules = state.acl.rules();
    let peers = if omit_peers {
        Vec::new()
    } else {
        peers_of(node, &all_nodes, &rules)
    };

    // the node's own block is omitted once its registration has expired
    let self_node = (!node.is_expired()).then(|| build_map_node(node, false));

    let peer_nodes: Vec<MapNode> = peers.iter().map(|p| build_map_node(p, true)).collect();

    // one profile per distinct namespace appearing in the response
    let mut profile_ids: BTreeSet<u64> = peers.iter().map(|p| p.namespace_id.0).collect();
    profile_ids.insert(node.namespace_id.0);
    let user_profiles: Vec<UserProfile> = profile_ids
        .into_iter()
        .filter_map(|id| namespaces.get(&id))
        .map(|ns| UserProfile {
            id: ns.id.0,
            login_name: ns.name.clone(),
            display_name: ns.name.clone(),
        })
        .collect();

    let packet_filter = if omit_peers {
        Vec::new()
    } else {
        rules.as_ref().clone()
    };

    let dns_config = build_dns_config(state, node, &peers, &namespaces);

    Ok(MapResponse {
        keep_alive: false,
        node: self_node,
        peers: peer_nodes,
        dns_config: Some(dns_config),
        derp_map: Some(state.derp_map.as_ref().clone()),
        packet_filter,
        user_profiles,
        domain: state.config.base_domain.clone(),
        control_time: Some(Utc::now().to_rfc3339()),
    })
}
