//! ephemeral node garbage collection.
//!
//! nodes registered with an ephemeral pre-auth key are scheduled for
//! deletion when their stream disconnects and deleted after the
//! configured inactivity window unless they reconnect first.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use wirescale_db::{Database, IpAllocator, WirescaleDb};
use wirescale_types::NodeId;

/// garbage collector for ephemeral nodes.
#[derive(Clone)]
pub struct EphemeralGc {
    /// node id -> instant the node becomes collectable.
    scheduled: Arc<RwLock<HashMap<NodeId, DateTime<Utc>>>>,
    db: WirescaleDb,
    ip_allocator: Arc<Mutex<IpAllocator>>,
    timeout: Duration,
}

impl EphemeralGc {
    /// create a collector. a zero `timeout_secs` disables collection.
    pub fn new(db: WirescaleDb, ip_allocator: Arc<Mutex<IpAllocator>>, timeout_secs: u64) -> Self {
        Self {
            scheduled: Arc::new(RwLock::new(HashMap::new())),
            db,
            ip_allocator,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// whether collection is enabled.
    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// schedule a node for deletion after the inactivity window.
    pub async fn schedule_deletion(&self, node_id: NodeId) {
        if !self.is_enabled() {
            return;
        }
        let delete_at = Utc::now()
            + chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::zero());
        debug!(node_id = node_id.0, %delete_at, "scheduling ephemeral node for deletion");
        self.scheduled.write().await.insert(node_id, delete_at);
    }

    /// cancel a scheduled deletion (the node reconnected).
    pub async fn cancel_deletion(&self, node_id: NodeId) {
        if self.scheduled.write().await.remove(&node_id).is_some() {
            debug!(node_id = node_id.0, "cancelled ephemeral deletion");
        }
    }

    /// number of nodes currently scheduled.
    pub async fn scheduled_count(&self) -> usize {
        self.scheduled.read().await.len()
    }

    /// run one collection cycle. returns the ids of deleted nodes.
    pub async fn collect(&self) -> Vec<NodeId> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let now = Utc::now();
        let due: Vec<NodeId> = {
            let scheduled = self.scheduled.read().await;
            scheduled
                .iter()
                .filter(|(_, delete_at)| now >= **delete_at)
                .map(|(id, _)| *id)
                .collect()
        };

        let mut deleted = Vec::new();
        for node_id in due {
            self.scheduled.write().await.remove(&node_id);

            let node_ips: Vec<IpAddr> = match self.db.get_node(node_id).await {
                Ok(Some(node)) => node.ips(),
                _ => Vec::new(),
            };

            match self.db.delete_node(node_id).await {
                Ok(()) => {
                    let mut allocator = self.ip_allocator.lock().await;
                    for ip in node_ips {
                        allocator.release(ip);
                    }
                    info!(node_id = node_id.0, "deleted inactive ephemeral node");
                    deleted.push(node_id);
                }
                Err(e) => {
                    warn!(node_id = node_id.0, error = %e, "failed to delete ephemeral node");
                }
            }
        }
        deleted
    }

    /// spawn the background collection task.
    pub fn spawn_collector(
        self,
        interval: Duration,
        on_deleted: impl Fn(Vec<NodeId>) + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.is_enabled() {
                debug!("ephemeral garbage collector disabled (timeout = 0)");
                return;
            }

            info!(
                timeout_secs = self.timeout.as_secs(),
                interval_secs = interval.as_secs(),
                "starting ephemeral garbage collector"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let deleted = self.collect().await;
                if !deleted.is_empty() {
                    on_deleted(deleted);
                }
            }
        })
    }
}
