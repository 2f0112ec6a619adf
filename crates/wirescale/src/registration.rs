//! node creation shared by the auth-key, oidc and operator paths.

use chrono::{DateTime, Utc};
use tracing::info;
use wirescale_db::Database;
use wirescale_types::{
    DiscoKey, HostInfo, MachineKey, NamespaceId, Node, NodeId, NodeKey, NodeName, RegisterMethod,
};

use crate::AppState;

/// parameters for a new node record.
pub struct NewNode {
    /// authenticated machine key.
    pub machine_key: MachineKey,
    /// node key presented by the client.
    pub node_key: NodeKey,
    /// host info from the register request.
    pub hostinfo: Option<HostInfo>,
    /// requested registration expiry.
    pub expiry: Option<DateTime<Utc>>,
    /// namespace the node is bound to.
    pub namespace_id: NamespaceId,
    /// how the binding was authorised.
    pub register_method: RegisterMethod,
    /// pre-auth key that authorised the binding, if any.
    pub auth_key_id: Option<u64>,
    /// whether the node is deleted after disconnect.
    pub ephemeral: bool,
}

/// create a node record: allocate addresses, pick a unique name, insert.
///
/// the allocator mutex doubles as the single-writer lock for the
/// ip-allocation + node-create critical section.
pub async fn create_node(state: &AppState, new: NewNode) -> Result<Node, wirescale_db::Error> {
    let raw_hostname = new
        .hostinfo
        .as_ref()
        .and_then(|h| h.hostname.clone())
        .unwrap_or_default();
    let hostname = NodeName::sanitise(&raw_hostname)
        .map(|n| n.into_inner())
        .unwrap_or_else(|| "node".to_string());

    let mut allocator = state.ip_allocator.lock().await;
    let (ipv4, ipv6) = allocator.allocate()?;

    let given_name = unique_given_name(state, new.namespace_id, &hostname).await?;

    let now = Utc::now();
    let node = Node {
        id: NodeId(0),
        machine_key: new.machine_key,
        node_key: new.node_key,
        disco_key: DiscoKey::default(),
        endpoints: vec![],
        hostinfo: new.hostinfo,
        ipv4,
        ipv6,
        hostname,
        given_name,
        namespace_id: new.namespace_id,
        register_method: new.register_method,
        auth_key_id: new.auth_key_id,
        ephemeral: new.ephemeral,
        expiry: new.expiry,
        last_seen: None,
        last_successful_update: None,
        enabled_routes: vec![],
        created_at: now,
        updated_at: now,
    };

    let created = match state.db.create_node(&node).await {
        Ok(created) => created,
        Err(e) => {
            // hand the addresses back so a failed insert doesn't leak them
            if let Some(ip) = node.ipv4 {
                allocator.release(ip);
            }
            if let Some(ip) = node.ipv6 {
                allocator.release(ip);
            }
            return Err(e);
        }
    };
    drop(allocator);

    info!(
        node_id = created.id.0,
        name = %created.given_name,
        namespace_id = created.namespace_id.0,
        method = created.register_method.as_str(),
        "registered new node"
    );
    Ok(created)
}

/// delete a node and release its addresses.
pub async fn delete_node(state: &AppState, node: &Node) -> Result<(), wirescale_db::Error> {
    state.db.delete_node(node.id).await?;
    let mut allocator = state.ip_allocator.lock().await;
    for ip in node.ips() {
        allocator.release(ip);
    }
    Ok(())
}

/// pick a given name that is unique within the namespace, appending a
/// numeric suffix on collision.
async fn unique_given_name(
    state: &AppState,
    namespace_id: NamespaceId,
    base: &str,
) -> Result<String, wirescale_db::Error> {
    let existing: Vec<String> = state
        .db
        .list_nodes_in_namespace(namespace_id)
        .await?
        .into_iter()
        .map(|n| n.given_name)
        .collect();

    if !existing.iter().any(|name| name == base) {
        return Ok(base.to_string());
    }
    for i in 2.. {
        let candidate = format!("{base}-{i}");
        if !existing.iter().any(|name| name == &candidate) {
            return Ok(candidate);
        }
    }
    unreachable!("suffix search always terminates");
}
