//! handler for `/machine/:mkey/map` - the long-poll engine.
//!
//! the same sealed request starts a bootstrap fetch (`ReadOnly`), a
//! one-shot endpoint update (`OmitPeers` without `Stream`) or a streaming
//! session. a streaming session owns three cooperating tasks: this
//! handler's frame stream, a keep-alive ticker, and the node's update
//! channel in the broadcaster registry.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, trace, warn};
use wirescale_db::Database;
use wirescale_proto::{MapRequest, MapResponse, seal_framed};
use wirescale_types::{MachineKey, NodeId};

use super::{ApiError, OptionExt, ResultExt};
use crate::{AppState, map_builder};

fn octet_response(body: impl Into<Body>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(body.into())
        .expect("valid status and headers")
}

/// handle a map request.
pub async fn map(
    State(state): State<AppState>,
    Path(mkey): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let machine_key =
        MachineKey::from_hex(&mkey).map_err(|_| ApiError::bad_request("invalid machine key"))?;

    let plaintext = state
        .keypair
        .open(machine_key.as_bytes(), &body)
        .map_err(|_| ApiError::unauthorized("bad_seal"))?;
    let req: MapRequest = serde_json::from_slice(&plaintext)
        .map_err(|_| ApiError::bad_request("invalid map request"))?;

    let mut node = state
        .db
        .get_node_by_machine_key(&machine_key)
        .await
        .map_internal()?
        .or_unauthorized("unknown_machine")?;

    debug!(
        node_id = node.id.0,
        read_only = req.read_only,
        omit_peers = req.omit_peers,
        stream = req.stream,
        "map request"
    );

    // fold the request's self-report into the node record. a read-only
    // request is a bootstrap fetch: endpoints are ignored and last_seen
    // untouched so peers are not notified of an empty endpoint list.
    if let Some(disco_key) = &req.disco_key {
        node.disco_key = disco_key.clone();
    }
    if let Some(hostinfo) = &req.hostinfo {
        if let Some(hostname) = &hostinfo.hostname {
            node.hostname = hostname.clone();
        }
        node.hostinfo = Some(hostinfo.clone());
    }
    if !req.read_only {
        node.endpoints = req.endpoints.clone();
        node.last_seen = Some(Utc::now());
    }
    let node = state.db.update_node(&node).await.map_internal()?;

    // the node's self-report is a mutation its peers care about
    if !req.read_only {
        state.state_updated(Some(&node)).await;
    }

    // the epoch this response will have covered once delivered. captured
    // before assembly so a change landing mid-build still reads as missed.
    let covered_epoch = state.broadcaster.last_change();

    let response = map_builder::build_map_response(&state, &node, req.omit_peers)
        .await
        .map_internal()?;
    let initial = seal_framed(&state.keypair, machine_key.as_bytes(), &response)
        .map_err(ApiError::internal)?;

    if req.read_only {
        return Ok(octet_response(initial));
    }

    if req.omit_peers && req.stream {
        return Err(ApiError::bad_request("cannot stream without peers"));
    }
    if !req.stream {
        return Ok(octet_response(initial));
    }

    info!(node_id = node.id.0, name = %node.given_name, "starting map stream");
    Ok(streaming_response(state, node.id, machine_key, node.ephemeral, initial, covered_epoch).await)
}

/// build the streaming response for a session.
async fn streaming_response(
    state: AppState,
    node_id: NodeId,
    machine_key: MachineKey,
    ephemeral: bool,
    initial: Bytes,
    covered_epoch: DateTime<Utc>,
) -> Response {
    // register the update channel before the initial map is sent so no
    // change between assembly and the stream start is lost
    let (channel_handle, update_rx) = state.broadcaster.open_channel(node_id).await;
    if ephemeral {
        state.ephemeral_gc.cancel_deletion(node_id).await;
    }

    let (keepalive_tx, keepalive_rx) = mpsc::channel::<Bytes>(1);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    spawn_keepalive(
        state.clone(),
        node_id,
        machine_key.clone(),
        keepalive_tx,
        cancel_rx,
    );

    let session = StreamSession {
        state: state.clone(),
        node_id,
        machine_key,
        update_rx,
        keepalive_rx,
        initial: Some((initial, covered_epoch)),
    };
    let frames = stream::unfold(session, |mut session| async move {
        session.next_frame().await.map(|frame| (frame, session))
    });

    let guarded = TeardownStream {
        inner: Box::pin(frames),
        state,
        node_id,
        ephemeral,
        channel_handle,
        cancel_tx,
    };

    octet_response(Body::from_stream(guarded.map(Ok::<_, Infallible>)))
}

/// per-session state driving the frame stream.
struct StreamSession {
    state: AppState,
    node_id: NodeId,
    machine_key: MachineKey,
    update_rx: mpsc::Receiver<()>,
    keepalive_rx: mpsc::Receiver<Bytes>,
    initial: Option<(Bytes, DateTime<Utc>)>,
}

impl StreamSession {
    /// produce the next frame, or `None` to end the stream.
    async fn next_frame(&mut self) -> Option<Bytes> {
        if let Some((initial, covered)) = self.initial.take() {
            self.mark_delivered(Some(covered)).await;
            return Some(initial);
        }

        loop {
            tokio::select! {
                frame = self.keepalive_rx.recv() => {
                    let frame = frame?;
                    trace!(node_id = self.node_id.0, "sending keep-alive");
                    self.mark_delivered(None).await;
                    return Some(frame);
                }
                signal = self.update_rx.recv() => {
                    // a closed channel means a reconnect took the slot over
                    signal?;
                    let node = self.state.db.get_node(self.node_id).await.ok().flatten()?;
                    if !node.is_outdated(self.state.broadcaster.last_change()) {
                        // burst already covered by an earlier map
                        continue;
                    }
                    trace!(node_id = self.node_id.0, "sending updated map");
                    let covered = self.state.broadcaster.last_change();
                    let response =
                        map_builder::build_map_response(&self.state, &node, false).await.ok()?;
                    let frame = seal_framed(
                        &self.state.keypair,
                        self.machine_key.as_bytes(),
                        &response,
                    )
                    .ok()?;
                    self.mark_delivered(Some(covered)).await;
                    return Some(frame);
                }
            }
        }
    }

    /// stamp the node after a frame goes out.
    ///
    /// keep-alives only update `last_seen`; full maps also advance
    /// `last_successful_update` to the epoch the map covered, so liveness
    /// never masks staleness and a change landing mid-build still reads
    /// as missed.
    async fn mark_delivered(&self, covered: Option<DateTime<Utc>>) {
        if let Ok(Some(mut node)) = self.state.db.get_node(self.node_id).await {
            node.last_seen = Some(Utc::now());
            if let Some(covered) = covered {
                node.last_successful_update = Some(covered);
            }
            if let Err(e) = self.state.db.update_node(&node).await {
                warn!(node_id = self.node_id.0, error = %e, "failed to stamp node after frame");
            }
        }
    }
}

/// spawn the per-session keep-alive task.
///
/// it owns two tickers: the keep-alive interval producing liveness frames
/// and the freshness interval that re-reads the node row and nudges the
/// session's own update channel when it has fallen behind the epoch.
/// the task ends when the cancel channel fires or the session goes away.
fn spawn_keepalive(
    state: AppState,
    node_id: NodeId,
    machine_key: MachineKey,
    keepalive_tx: mpsc::Sender<Bytes>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let keepalive_period = match state.config.tuning.keepalive_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut keepalive_ticker =
            keepalive_period.map(|period| interval_at(Instant::now() + period, period));

        let freshness_period =
            Duration::from_secs(state.config.tuning.update_check_interval_secs.max(1));
        let mut freshness_ticker =
            interval_at(Instant::now() + freshness_period, freshness_period);

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => return,
                _ = tick_or_never(&mut keepalive_ticker) => {
                    let Ok(frame) = seal_framed(
                        &state.keypair,
                        machine_key.as_bytes(),
                        &MapResponse::keepalive(),
                    ) else {
                        return;
                    };
                    if keepalive_tx.send(frame).await.is_err() {
                        return;
                    }
                }
                _ = freshness_ticker.tick() => {
                    match state.db.get_node(node_id).await {
                        Ok(Some(node)) => {
                            if node.is_outdated(state.broadcaster.last_change()) {
                                state.broadcaster.signal(node_id).await;
                            }
                        }
                        // the node is gone; the stream ends on its own
                        _ => return,
                    }
                }
            }
        }
    });
}

/// tick an optional interval, or park forever when disabled.
async fn tick_or_never(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// stream wrapper that tears the session down when the client goes away.
///
/// dropping the response body is the only disconnect signal axum gives
/// us: stamp last_seen, stop the keep-alive task, unregister the update
/// channel, and schedule ephemeral deletion.
struct TeardownStream<S> {
    inner: Pin<Box<S>>,
    state: AppState,
    node_id: NodeId,
    ephemeral: bool,
    channel_handle: mpsc::Sender<()>,
    cancel_tx: watch::Sender<bool>,
}

impl<S, T> Stream for TeardownStream<S>
where
    S: Stream<Item = T>,
{
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<S> Drop for TeardownStream<S> {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);

        let state = self.state.clone();
        let node_id = self.node_id;
        let ephemeral = self.ephemeral;
        let channel_handle = self.channel_handle.clone();

        // drop can't await; finish the teardown on the runtime
        tokio::spawn(async move {
            info!(node_id = node_id.0, "map stream closed");
            state.broadcaster.close_channel(node_id, &channel_handle).await;

            if let Ok(Some(mut node)) = state.db.get_node(node_id).await {
                node.last_seen = Some(Utc::now());
                if let Err(e) = state.db.update_node(&node).await {
                    warn!(node_id = node_id.0, error = %e, "failed to stamp node on disconnect");
                }
            }

            if ephemeral {
                state.ephemeral_gc.schedule_deletion(node_id).await;
            }
        });
    }
}
