//! expansion of policy aliases into concrete filter rules.
//!
//! compilation is deterministic: given the same policy and node set the
//! emitted rule list is byte-stable. nodes are visited in ascending id
//! order and rule order preserves policy order.

use std::collections::HashMap;

use ipnet::IpNet;
use wirescale_proto::{FilterRule, NetPortRange, PortRange};
use wirescale_types::{Namespace, Node};

use crate::{AclPolicy, Error, Result};

/// compile a policy over a namespace/node snapshot into filter rules.
pub fn compile(
    policy: &AclPolicy,
    namespaces: &[Namespace],
    nodes: &[Node],
) -> Result<Vec<FilterRule>> {
    let ctx = Context::new(policy, namespaces, nodes);
    let mut rules = Vec::with_capacity(policy.acls.len());

    for acl in &policy.acls {
        if acl.action != "accept" {
            return Err(Error::InvalidAction);
        }

        let mut src_ips = Vec::new();
        for user in &acl.users {
            src_ips.extend(ctx.expand_alias(user)?);
        }

        let mut dst_ports = Vec::new();
        for port in &acl.ports {
            dst_ports.extend(ctx.expand_dest(port)?);
        }

        rules.push(FilterRule { src_ips, dst_ports });
    }

    Ok(rules)
}

/// snapshot the compiler expands aliases against.
struct Context<'a> {
    policy: &'a AclPolicy,
    namespace_names: Vec<&'a str>,
    /// nodes grouped by namespace name, each group in ascending id order.
    nodes_by_namespace: HashMap<&'a str, Vec<&'a Node>>,
}

impl<'a> Context<'a> {
    fn new(policy: &'a AclPolicy, namespaces: &'a [Namespace], nodes: &'a [Node]) -> Self {
        let mut sorted: Vec<&Node> = nodes.iter().collect();
        sorted.sort_by_key(|n| n.id);

        let by_id: HashMap<_, _> = namespaces.iter().map(|ns| (ns.id, ns.name.as_str())).collect();
        let mut nodes_by_namespace: HashMap<&str, Vec<&Node>> = HashMap::new();
        for ns in namespaces {
            nodes_by_namespace.entry(ns.name.as_str()).or_default();
        }
        for node in sorted {
            if let Some(name) = by_id.get(&node.namespace_id) {
                nodes_by_namespace.entry(name).or_default().push(node);
            }
        }

        Self {
            policy,
            namespace_names: namespaces.iter().map(|ns| ns.name.as_str()).collect(),
            nodes_by_namespace,
        }
    }

    /// expand an alias into a list of ip strings.
    ///
    /// resolution order: wildcard, group, tag, namespace, policy host,
    /// ip literal, cidr literal. anything else is an invalid user section.
    fn expand_alias(&self, alias: &str) -> Result<Vec<String>> {
        if alias == "*" {
            return Ok(vec!["*".to_string()]);
        }

        if alias.starts_with("group:") {
            let namespaces = self.expand_group(alias)?;
            let mut ips = Vec::new();
            for ns in namespaces {
                let nodes = self
                    .nodes_by_namespace
                    .get(ns.as_str())
                    .ok_or_else(|| Error::InvalidNamespace(ns.clone()))?;
                for node in nodes {
                    ips.extend(node.ips().iter().map(|ip| ip.to_string()));
                }
            }
            return Ok(ips);
        }

        if alias.starts_with("tag:") {
            let owners = self.expand_tag_owners(alias)?;
            let mut ips = Vec::new();
            for ns in owners {
                // unknown owner namespaces are skipped, not an error:
                // the tag entry may predate the namespace
                let Some(nodes) = self.nodes_by_namespace.get(ns.as_str()) else {
                    continue;
                };
                for node in nodes {
                    if node.requested_tags().iter().any(|t| t == alias) {
                        ips.extend(node.ips().iter().map(|ip| ip.to_string()));
                    }
                }
            }
            return Ok(ips);
        }

        if self.namespace_names.contains(&alias) {
            let nodes = &self.nodes_by_namespace[alias];
            return Ok(nodes
                .iter()
                .flat_map(|n| n.ips().into_iter().map(|ip| ip.to_string()))
                .collect());
        }

        if let Some(net) = self.policy.hosts.get(alias) {
            return Ok(vec![net.to_string()]);
        }

        if let Ok(ip) = alias.parse::<std::net::IpAddr>() {
            return Ok(vec![ip.to_string()]);
        }

        if let Ok(cidr) = alias.parse::<IpNet>() {
            return Ok(vec![cidr.to_string()]);
        }

        Err(Error::InvalidUserSection)
    }

    /// resolve a tag to the namespaces permitted to claim it.
    ///
    /// an owner is a namespace or a group; groups expand one level and
    /// cannot nest.
    fn expand_tag_owners(&self, tag: &str) -> Result<Vec<String>> {
        let owners = self
            .policy
            .tag_owners
            .get(tag)
            .ok_or_else(|| Error::InvalidTag(tag.to_string()))?;

        let mut namespaces = Vec::new();
        for owner in owners {
            if owner.starts_with("group:") {
                namespaces.extend(self.expand_group(owner)?);
            } else {
                namespaces.push(owner.clone());
            }
        }
        Ok(namespaces)
    }

    /// resolve a group to its member namespaces.
    fn expand_group(&self, group: &str) -> Result<Vec<String>> {
        let members = self
            .policy
            .groups
            .get(group)
            .ok_or_else(|| Error::InvalidGroup(group.to_string()))?;
        for member in members {
            if member.starts_with("group:") {
                // groups cannot be composed of groups
                return Err(Error::InvalidGroup(group.to_string()));
            }
        }
        Ok(members.clone())
    }

    /// expand a destination token (`host:portspec`) into net/port ranges.
    ///
    /// tag-prefixed hosts use two colons (`tag:x:443`), everything else
    /// one. the final token is always the port spec.
    fn expand_dest(&self, dest: &str) -> Result<Vec<NetPortRange>> {
        let tokens: Vec<&str> = dest.split(':').collect();
        if tokens.len() < 2 || tokens.len() > 3 {
            return Err(Error::InvalidPortFormat);
        }

        let alias = if tokens.len() == 2 {
            tokens[0].to_string()
        } else {
            format!("{}:{}", tokens[0], tokens[1])
        };

        let expanded = self.expand_alias(&alias)?;
        let ports = expand_ports(tokens[tokens.len() - 1])?;

        let mut dests = Vec::with_capacity(expanded.len() * ports.len());
        for ip in &expanded {
            for range in &ports {
                dests.push(NetPortRange {
                    ip: ip.clone(),
                    ports: *range,
                });
            }
        }
        Ok(dests)
    }
}

/// parse a port spec: `*`, or a comma-separated list of `N` / `N-M`.
fn expand_ports(spec: &str) -> Result<Vec<PortRange>> {
    if spec == "*" {
        return Ok(vec![PortRange::ALL]);
    }

    let mut ranges = Vec::new();
    for part in spec.split(',') {
        let bounds: Vec<&str> = part.split('-').collect();
        match bounds.as_slice() {
            [single] => {
                let port: u16 = single.parse().map_err(|_| Error::InvalidPortFormat)?;
                ranges.push(PortRange {
                    first: port,
                    last: port,
                });
            }
            [first, last] => {
                let first: u16 = first.parse().map_err(|_| Error::InvalidPortFormat)?;
                let last: u16 = last.parse().map_err(|_| Error::InvalidPortFormat)?;
                ranges.push(PortRange { first, last });
            }
            _ => return Err(Error::InvalidPortFormat),
        }
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirescale_types::test_utils::{TestNodeBuilder, test_namespace};
    use wirescale_types::NamespaceId;

    fn fixture() -> (Vec<Namespace>, Vec<Node>) {
        let namespaces = vec![test_namespace(1, "alice"), test_namespace(2, "bob")];
        let nodes = vec![
            TestNodeBuilder::new(1)
                .with_namespace(NamespaceId(1))
                .with_hostname("laptop")
                .with_ipv4("100.64.0.1".parse().unwrap())
                .build(),
            TestNodeBuilder::new(2)
                .with_namespace(NamespaceId(2))
                .with_hostname("server")
                .with_ipv4("100.64.0.2".parse().unwrap())
                .build(),
        ];
        (namespaces, nodes)
    }

    #[test]
    fn test_group_expansion_rule() {
        let policy = AclPolicy::parse(
            r#"{
                "groups": {"group:admins": ["alice"]},
                "acls": [{"action": "accept", "users": ["group:admins"], "ports": ["*:22"]}]
            }"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();

        let rules = compile(&policy, &namespaces, &nodes).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].src_ips, vec!["100.64.0.1"]);
        assert_eq!(rules[0].dst_ports.len(), 1);
        assert_eq!(rules[0].dst_ports[0].ip, "*");
        assert_eq!(rules[0].dst_ports[0].ports, PortRange { first: 22, last: 22 });
    }

    #[test]
    fn test_reject_action_invalid() {
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "reject", "users": ["*"], "ports": ["*:22"]}]}"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();
        assert_eq!(
            compile(&policy, &namespaces, &nodes),
            Err(Error::InvalidAction)
        );
    }

    #[test]
    fn test_tag_expansion_is_owner_gated() {
        let policy = AclPolicy::parse(
            r#"{
                "tagOwners": {"tag:web": ["alice"]},
                "acls": [{"action": "accept", "users": ["tag:web"], "ports": ["*:80"]}]
            }"#,
        )
        .unwrap();
        let namespaces = vec![test_namespace(1, "alice"), test_namespace(2, "bob")];
        let nodes = vec![
            // alice's node requests the tag: included
            TestNodeBuilder::new(1)
                .with_namespace(NamespaceId(1))
                .with_ipv4("100.64.0.3".parse().unwrap())
                .with_request_tags(vec!["tag:web".to_string()])
                .build(),
            // bob's node requests the same tag but bob is not an owner: excluded
            TestNodeBuilder::new(2)
                .with_namespace(NamespaceId(2))
                .with_ipv4("100.64.0.4".parse().unwrap())
                .with_request_tags(vec!["tag:web".to_string()])
                .build(),
        ];

        let rules = compile(&policy, &namespaces, &nodes).unwrap();
        assert_eq!(rules[0].src_ips, vec!["100.64.0.3"]);
    }

    #[test]
    fn test_unowned_tag_is_invalid() {
        let policy = AclPolicy::parse(
            r#"{
                "hosts": {"h": "10.0.0.1"},
                "acls": [{"action": "accept", "users": ["tag:ghost"], "ports": ["h:80"]}]
            }"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();
        assert_eq!(
            compile(&policy, &namespaces, &nodes),
            Err(Error::InvalidTag("tag:ghost".to_string()))
        );
    }

    #[test]
    fn test_tag_dest_uses_three_tokens() {
        let policy = AclPolicy::parse(
            r#"{
                "tagOwners": {"tag:web": ["alice"]},
                "acls": [{"action": "accept", "users": ["*"], "ports": ["tag:web:443"]}]
            }"#,
        )
        .unwrap();
        let namespaces = vec![test_namespace(1, "alice")];
        let nodes = vec![
            TestNodeBuilder::new(1)
                .with_namespace(NamespaceId(1))
                .with_ipv4("100.64.0.9".parse().unwrap())
                .with_request_tags(vec!["tag:web".to_string()])
                .build(),
        ];

        let rules = compile(&policy, &namespaces, &nodes).unwrap();
        assert_eq!(rules[0].dst_ports.len(), 1);
        assert_eq!(rules[0].dst_ports[0].ip, "100.64.0.9");
        assert_eq!(
            rules[0].dst_ports[0].ports,
            PortRange {
                first: 443,
                last: 443
            }
        );
    }

    #[test]
    fn test_port_list_and_ranges() {
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["*"], "ports": ["10.0.0.0/8:80,443,8000-8100"]}]}"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();

        let rules = compile(&policy, &namespaces, &nodes).unwrap();
        let ports: Vec<PortRange> = rules[0].dst_ports.iter().map(|d| d.ports).collect();
        assert_eq!(
            ports,
            vec![
                PortRange { first: 80, last: 80 },
                PortRange {
                    first: 443,
                    last: 443
                },
                PortRange {
                    first: 8000,
                    last: 8100
                },
            ]
        );
        assert!(rules[0].dst_ports.iter().all(|d| d.ip == "10.0.0.0/8"));
    }

    #[test]
    fn test_too_many_tokens_is_invalid_port_format() {
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["*"], "ports": ["foo:bar:baz:qux"]}]}"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();
        assert_eq!(
            compile(&policy, &namespaces, &nodes),
            Err(Error::InvalidPortFormat)
        );
    }

    #[test]
    fn test_port_out_of_range_is_invalid() {
        assert_eq!(expand_ports("70000"), Err(Error::InvalidPortFormat));
        assert_eq!(expand_ports("22-"), Err(Error::InvalidPortFormat));
        assert_eq!(expand_ports("a-b"), Err(Error::InvalidPortFormat));
    }

    #[test]
    fn test_wildcard_ports() {
        assert_eq!(expand_ports("*"), Ok(vec![PortRange::ALL]));
    }

    #[test]
    fn test_namespace_alias() {
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["bob"], "ports": ["alice:22"]}]}"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();

        let rules = compile(&policy, &namespaces, &nodes).unwrap();
        assert_eq!(rules[0].src_ips, vec!["100.64.0.2"]);
        assert_eq!(rules[0].dst_ports[0].ip, "100.64.0.1");
    }

    #[test]
    fn test_host_and_literal_aliases() {
        let policy = AclPolicy::parse(
            r#"{
                "hosts": {"git": "10.1.2.3"},
                "acls": [{
                    "action": "accept",
                    "users": ["192.0.2.7", "172.16.0.0/12"],
                    "ports": ["git:9418"]
                }]
            }"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();

        let rules = compile(&policy, &namespaces, &nodes).unwrap();
        assert_eq!(rules[0].src_ips, vec!["192.0.2.7", "172.16.0.0/12"]);
        assert_eq!(rules[0].dst_ports[0].ip, "10.1.2.3/32");
    }

    #[test]
    fn test_unknown_alias_is_invalid_user_section() {
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["nobody-anywhere"], "ports": ["*:22"]}]}"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();
        assert_eq!(
            compile(&policy, &namespaces, &nodes),
            Err(Error::InvalidUserSection)
        );
    }

    #[test]
    fn test_nested_group_is_invalid() {
        let policy = AclPolicy::parse(
            r#"{
                "groups": {"group:outer": ["group:inner"], "group:inner": ["alice"]},
                "acls": [{"action": "accept", "users": ["group:outer"], "ports": ["*:22"]}]
            }"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();
        assert_eq!(
            compile(&policy, &namespaces, &nodes),
            Err(Error::InvalidGroup("group:outer".to_string()))
        );
    }

    #[test]
    fn test_group_with_unknown_namespace_is_invalid() {
        let policy = AclPolicy::parse(
            r#"{
                "groups": {"group:eng": ["nonexistent"]},
                "acls": [{"action": "accept", "users": ["group:eng"], "ports": ["*:22"]}]
            }"#,
        )
        .unwrap();
        let (namespaces, nodes) = fixture();
        assert_eq!(
            compile(&policy, &namespaces, &nodes),
            Err(Error::InvalidNamespace("nonexistent".to_string()))
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let policy = AclPolicy::parse(
            r#"{
                "groups": {"group:all": ["alice", "bob"]},
                "acls": [{"action": "accept", "users": ["group:all"], "ports": ["alice:22", "bob:80-90"]}]
            }"#,
        )
        .unwrap();
        let (namespaces, mut nodes) = fixture();

        let first = compile(&policy, &namespaces, &nodes).unwrap();
        // shuffle input order; output must not change
        nodes.reverse();
        let second = compile(&policy, &namespaces, &nodes).unwrap();
        assert_eq!(first, second);
    }
}
