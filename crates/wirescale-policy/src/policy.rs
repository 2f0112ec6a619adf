//! the acl policy document.

use std::collections::HashMap;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// an operator-authored access policy.
///
/// loaded at startup and on reload from a permissive json document
/// (comments and trailing commas tolerated).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AclPolicy {
    /// group name -> list of namespace names. groups never nest.
    #[serde(default, alias = "Groups")]
    pub groups: HashMap<String, Vec<String>>,

    /// `tag:x` -> list of namespaces or groups permitted to claim the tag.
    #[serde(default, rename = "tagOwners", alias = "TagOwners")]
    pub tag_owners: HashMap<String, Vec<String>>,

    /// host alias -> single ip or cidr literal.
    #[serde(default, alias = "Hosts", deserialize_with = "deserialize_hosts")]
    pub hosts: HashMap<String, IpNet>,

    /// ordered access rules.
    #[serde(default, alias = "ACLs", alias = "Acls")]
    pub acls: Vec<Acl>,
}

/// a single access rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acl {
    /// the rule action. only "accept" is valid.
    pub action: String,

    /// source aliases.
    #[serde(default, alias = "Users")]
    pub users: Vec<String>,

    /// destination `host:portspec` tokens.
    #[serde(default, alias = "Ports")]
    pub ports: Vec<String>,
}

impl AclPolicy {
    /// parse a policy from its permissive-json text form.
    ///
    /// an otherwise valid document with no sections at all is rejected as
    /// `empty_policy`.
    pub fn parse(contents: &str) -> Result<Self> {
        let policy: AclPolicy =
            json5::from_str(contents).map_err(|e| Error::Parse(e.to_string()))?;
        if policy.is_zero() {
            return Err(Error::EmptyPolicy);
        }
        Ok(policy)
    }

    /// whether the document has no content at all.
    pub fn is_zero(&self) -> bool {
        self.groups.is_empty()
            && self.tag_owners.is_empty()
            && self.hosts.is_empty()
            && self.acls.is_empty()
    }
}

/// host values are written as bare ips or cidrs; normalise both to IpNet.
fn deserialize_hosts<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, IpNet>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, value)| {
            let net = parse_host(&value).ok_or_else(|| {
                serde::de::Error::custom(format!("host {name} is not an ip or cidr: {value}"))
            })?;
            Ok((name, net))
        })
        .collect()
}

fn parse_host(value: &str) -> Option<IpNet> {
    if let Ok(net) = value.parse::<IpNet>() {
        return Some(net);
    }
    value.parse::<std::net::IpAddr>().ok().map(IpNet::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let policy = AclPolicy::parse(
            r#"{
                "groups": {"group:admins": ["alice"]},
                "acls": [{"action": "accept", "users": ["group:admins"], "ports": ["*:22"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(policy.acls.len(), 1);
        assert_eq!(policy.groups["group:admins"], vec!["alice"]);
    }

    #[test]
    fn test_parse_tolerates_comments_and_trailing_commas() {
        let policy = AclPolicy::parse(
            r#"{
                // operators write these by hand
                "hosts": {
                    "git-server": "10.0.0.2",
                    "lab": "192.168.0.0/24", // trailing comma next
                },
                "acls": [
                    {"action": "accept", "users": ["*"], "ports": ["git-server:*"],},
                ],
            }"#,
        )
        .unwrap();
        assert_eq!(policy.hosts.len(), 2);
        assert_eq!(policy.hosts["git-server"].to_string(), "10.0.0.2/32");
        assert_eq!(policy.hosts["lab"].to_string(), "192.168.0.0/24");
    }

    #[test]
    fn test_parse_pascal_case_aliases() {
        let policy = AclPolicy::parse(
            r#"{
                "Groups": {"group:eng": ["bob"]},
                "TagOwners": {"tag:web": ["group:eng"]},
                "ACLs": [{"action": "accept", "Users": ["*"], "Ports": ["*:*"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(policy.groups.len(), 1);
        assert_eq!(policy.tag_owners.len(), 1);
        assert_eq!(policy.acls.len(), 1);
    }

    #[test]
    fn test_empty_policy_rejected() {
        assert!(matches!(AclPolicy::parse("{}"), Err(Error::EmptyPolicy)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            AclPolicy::parse("not a policy"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_bad_host_rejected() {
        assert!(matches!(
            AclPolicy::parse(r#"{"hosts": {"bad": "not-an-ip"}}"#),
            Err(Error::Parse(_))
        ));
    }
}
