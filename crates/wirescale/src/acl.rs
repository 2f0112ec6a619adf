//! hot-swappable compiled acl state.
//!
//! the policy and its compiled rules are swapped atomically behind a lock;
//! readers clone the `Arc` snapshot at the start of each map assembly so
//! the hot path never holds the lock across work. a failed reload or
//! recompile keeps the previous rules.

use std::sync::{Arc, RwLock};

use tracing::warn;
use wirescale_policy::{AclPolicy, compile};
use wirescale_proto::FilterRule;
use wirescale_types::{Namespace, Node};

struct Snapshot {
    policy: Arc<AclPolicy>,
    rules: Arc<Vec<FilterRule>>,
}

/// shared compiled policy state.
#[derive(Clone)]
pub struct AclState {
    inner: Arc<RwLock<Snapshot>>,
}

impl AclState {
    /// create state from an initial policy with no compiled rules yet.
    pub fn new(policy: AclPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot {
                policy: Arc::new(policy),
                rules: Arc::new(Vec::new()),
            })),
        }
    }

    /// the current policy snapshot.
    pub fn policy(&self) -> Arc<AclPolicy> {
        self.inner.read().expect("acl lock poisoned").policy.clone()
    }

    /// the current compiled rules snapshot.
    pub fn rules(&self) -> Arc<Vec<FilterRule>> {
        self.inner.read().expect("acl lock poisoned").rules.clone()
    }

    /// replace the policy, compiling it over the given node set.
    ///
    /// on compile failure the previous policy and rules are kept and the
    /// error is returned for the operator.
    pub fn replace_policy(
        &self,
        policy: AclPolicy,
        namespaces: &[Namespace],
        nodes: &[Node],
    ) -> Result<(), wirescale_policy::Error> {
        let rules = compile(&policy, namespaces, nodes)?;
        let mut snapshot = self.inner.write().expect("acl lock poisoned");
        snapshot.policy = Arc::new(policy);
        snapshot.rules = Arc::new(rules);
        Ok(())
    }

    /// recompile the current policy over a fresh node set.
    ///
    /// called after node/namespace mutations. failures keep the previous
    /// rules: a policy that referenced a now-deleted namespace should not
    /// take the overlay down.
    pub fn recompile(&self, namespaces: &[Namespace], nodes: &[Node]) {
        let policy = self.policy();
        match compile(&policy, namespaces, nodes) {
            Ok(rules) => {
                self.inner.write().expect("acl lock poisoned").rules = Arc::new(rules);
            }
            Err(e) => {
                warn!(error = %e, "policy recompile failed, keeping previous filter rules");
            }
        }
    }
}

impl Default for AclState {
    fn default() -> Self {
        Self::new(AclPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirescale_types::NamespaceId;
    use wirescale_types::test_utils::{TestNodeBuilder, test_namespace};

    fn fixture() -> (Vec<Namespace>, Vec<Node>) {
        (
            vec![test_namespace(1, "alice")],
            vec![
                TestNodeBuilder::new(1)
                    .with_namespace(NamespaceId(1))
                    .with_ipv4("100.64.0.1".parse().unwrap())
                    .build(),
            ],
        )
    }

    #[test]
    fn test_replace_policy_compiles_rules() {
        let (namespaces, nodes) = fixture();
        let state = AclState::default();
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["alice"], "ports": ["*:22"]}]}"#,
        )
        .unwrap();

        state.replace_policy(policy, &namespaces, &nodes).unwrap();
        assert_eq!(state.rules().len(), 1);
    }

    #[test]
    fn test_failed_replace_keeps_previous() {
        let (namespaces, nodes) = fixture();
        let state = AclState::default();
        let good = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["alice"], "ports": ["*:22"]}]}"#,
        )
        .unwrap();
        state.replace_policy(good, &namespaces, &nodes).unwrap();

        let bad = AclPolicy::parse(
            r#"{"acls": [{"action": "reject", "users": ["alice"], "ports": ["*:22"]}]}"#,
        )
        .unwrap();
        assert!(state.replace_policy(bad, &namespaces, &nodes).is_err());
        // previous rules survive
        assert_eq!(state.rules().len(), 1);
    }

    #[test]
    fn test_recompile_tracks_node_changes() {
        let (namespaces, mut nodes) = fixture();
        let state = AclState::default();
        let policy = AclPolicy::parse(
            r#"{"acls": [{"action": "accept", "users": ["alice"], "ports": ["*:22"]}]}"#,
        )
        .unwrap();
        state.replace_policy(policy, &namespaces, &nodes).unwrap();
        assert_eq!(state.rules()[0].src_ips, vec!["100.64.0.1"]);

        nodes.push(
            TestNodeBuilder::new(2)
                .with_namespace(NamespaceId(1))
                .with_ipv4("100.64.0.2".parse().unwrap())
                .build(),
        );
        state.recompile(&namespaces, &nodes);
        assert_eq!(state.rules()[0].src_ips, vec!["100.64.0.1", "100.64.0.2"]);
    }
}
