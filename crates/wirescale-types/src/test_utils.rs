//! test utilities for creating test nodes and other fixtures.
//!
//! this module provides builder patterns for creating test instances
//! of wirescale types without needing to specify all fields.

use chrono::Utc;

use crate::{
    DiscoKey, HostInfo, MachineKey, Namespace, NamespaceId, Node, NodeId, NodeKey, RegisterMethod,
};

/// builder for creating test [`Node`] instances.
///
/// # example
/// ```
/// use wirescale_types::test_utils::TestNodeBuilder;
///
/// let node = TestNodeBuilder::new(1).build();
/// ```
#[derive(Debug, Clone)]
pub struct TestNodeBuilder {
    id: u64,
    namespace_id: Option<NamespaceId>,
    hostname: Option<String>,
    ipv4: Option<std::net::IpAddr>,
    ipv6: Option<std::net::IpAddr>,
    machine_key: Option<MachineKey>,
    node_key: Option<NodeKey>,
    hostinfo: Option<HostInfo>,
    ephemeral: bool,
}

impl TestNodeBuilder {
    /// create a new builder with the given node id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            namespace_id: None,
            hostname: None,
            ipv4: None,
            ipv6: None,
            machine_key: None,
            node_key: None,
            hostinfo: None,
            ephemeral: false,
        }
    }

    /// set the namespace id.
    pub fn with_namespace(mut self, namespace_id: NamespaceId) -> Self {
        self.namespace_id = Some(namespace_id);
        self
    }

    /// set a custom hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// set the ipv4 address.
    pub fn with_ipv4(mut self, ip: std::net::IpAddr) -> Self {
        self.ipv4 = Some(ip);
        self
    }

    /// set the ipv6 address.
    pub fn with_ipv6(mut self, ip: std::net::IpAddr) -> Self {
        self.ipv6 = Some(ip);
        self
    }

    /// set the machine key.
    pub fn with_machine_key(mut self, key: MachineKey) -> Self {
        self.machine_key = Some(key);
        self
    }

    /// set the node key.
    pub fn with_node_key(mut self, key: NodeKey) -> Self {
        self.node_key = Some(key);
        self
    }

    /// set host info (os, advertised routes, requested tags).
    pub fn with_hostinfo(mut self, hostinfo: HostInfo) -> Self {
        self.hostinfo = Some(hostinfo);
        self
    }

    /// request tags via host info.
    pub fn with_request_tags(mut self, tags: Vec<String>) -> Self {
        let mut hostinfo = self.hostinfo.take().unwrap_or_default();
        hostinfo.request_tags = tags;
        self.hostinfo = Some(hostinfo);
        self
    }

    /// mark as ephemeral.
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// build the [`Node`].
    pub fn build(self) -> Node {
        let hostname = self.hostname.unwrap_or_else(|| format!("node-{}", self.id));
        let now = Utc::now();

        Node {
            id: NodeId(self.id),
            machine_key: self
                .machine_key
                .unwrap_or_else(|| MachineKey::from_bytes(vec![self.id as u8; 32])),
            node_key: self
                .node_key
                .unwrap_or_else(|| NodeKey::from_bytes(vec![self.id as u8; 32])),
            disco_key: DiscoKey::default(),
            endpoints: vec![],
            hostinfo: self.hostinfo,
            ipv4: self.ipv4.or_else(|| Some("100.64.0.1".parse().unwrap())),
            ipv6: self.ipv6,
            hostname: hostname.clone(),
            given_name: hostname,
            namespace_id: self.namespace_id.unwrap_or(NamespaceId(self.id)),
            register_method: RegisterMethod::AuthKey,
            auth_key_id: None,
            ephemeral: self.ephemeral,
            expiry: None,
            last_seen: Some(now),
            last_successful_update: None,
            enabled_routes: vec![],
            created_at: now,
            updated_at: now,
        }
    }
}

/// create a test namespace with the given id and name.
pub fn test_namespace(id: u64, name: &str) -> Namespace {
    Namespace::new(NamespaceId(id), name).expect("valid test namespace name")
}
