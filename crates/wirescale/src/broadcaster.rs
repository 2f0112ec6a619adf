//! change broadcaster: the global change epoch plus the per-node
//! update-channel registry used to wake streaming map sessions.
//!
//! every state mutation advances the epoch and try-sends a wakeup to the
//! affected nodes' channels. senders never block: channels are bounded at
//! one pending signal and a full channel is simply skipped - the session
//! re-checks the epoch on its next freshness tick anyway.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;
use wirescale_types::NodeId;

struct Inner {
    /// wall-clock stamp of the most recent state mutation.
    last_change: RwLock<DateTime<Utc>>,
    /// per-node wakeup senders for active streaming sessions.
    channels: tokio::sync::RwLock<HashMap<NodeId, mpsc::Sender<()>>>,
}

/// broadcaster shared by all handlers.
#[derive(Clone)]
pub struct ChangeBroadcaster {
    inner: Arc<Inner>,
}

impl ChangeBroadcaster {
    /// create a new broadcaster with the epoch set to now.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                last_change: RwLock::new(Utc::now()),
                channels: tokio::sync::RwLock::new(HashMap::new()),
            }),
        }
    }

    /// the current change epoch.
    pub fn last_change(&self) -> DateTime<Utc> {
        *self
            .inner
            .last_change
            .read()
            .expect("epoch lock poisoned")
    }

    /// advance the change epoch to now and return the new value.
    pub fn advance(&self) -> DateTime<Utc> {
        let now = Utc::now();
        *self
            .inner
            .last_change
            .write()
            .expect("epoch lock poisoned") = now;
        now
    }

    /// register an update channel for a node's streaming session.
    ///
    /// a reconnect replaces the previous sender; the stale receiver ends
    /// with the session that owned it. the returned sender handle is the
    /// session's teardown credential for [`close_channel`].
    ///
    /// [`close_channel`]: ChangeBroadcaster::close_channel
    pub async fn open_channel(&self, node_id: NodeId) -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let mut channels = self.inner.channels.write().await;
        channels.insert(node_id, tx.clone());
        (tx, rx)
    }

    /// remove a node's update channel on disconnect.
    ///
    /// only removes the registration when it still belongs to the caller's
    /// session: a disconnecting session must not tear down the channel a
    /// reconnect has already installed.
    pub async fn close_channel(&self, node_id: NodeId, handle: &mpsc::Sender<()>) {
        let mut channels = self.inner.channels.write().await;
        if let Some(registered) = channels.get(&node_id)
            && registered.same_channel(handle)
        {
            channels.remove(&node_id);
        }
    }

    /// wake a node's session if one is connected. never blocks.
    pub async fn signal(&self, node_id: NodeId) {
        let channels = self.inner.channels.read().await;
        if let Some(tx) = channels.get(&node_id) {
            // drop-if-full: a pending signal already queued is enough
            if tx.try_send(()).is_err() {
                trace!(node_id = node_id.0, "update channel full or closed, skipping");
            }
        }
    }

    /// wake a set of nodes.
    pub async fn signal_many(&self, node_ids: &[NodeId]) {
        let channels = self.inner.channels.read().await;
        for node_id in node_ids {
            if let Some(tx) = channels.get(node_id) {
                let _ = tx.try_send(());
            }
        }
    }

    /// number of connected streaming sessions.
    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
