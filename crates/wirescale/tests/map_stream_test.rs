//! tests for streaming map sessions: fan-out, keep-alives, teardown.

mod common;

use axum::http::StatusCode;
use common::{TestClient, auth_key_register_request, create_namespace, create_preauth_key};
use wirescale_db::Database;
use wirescale_proto::{MapRequest, MapResponse};
use wirescale_types::Config;

async fn registered_client(ctx: &common::TestContext, namespace: &str, hostname: &str) -> TestClient {
    let ns = match ctx.state.db.get_namespace_by_name(namespace).await.unwrap() {
        Some(ns) => ns,
        None => create_namespace(ctx, namespace).await,
    };
    let (secret, _) = create_preauth_key(ctx, &ns, false, false).await;
    let client = TestClient::new();
    common::register_via_http(ctx, &client, &auth_key_register_request(&client, &secret, hostname))
        .await;
    client
}

async fn open_stream(
    ctx: &common::TestContext,
    client: &TestClient,
) -> impl futures_util::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin {
    let req = MapRequest {
        node_key: client.node_key(),
        stream: true,
        ..Default::default()
    };
    let body = client.seal(&ctx.state, &req);
    let response = common::post_machine(
        &ctx.app,
        &format!("/machine/{}/map", client.machine_key_hex()),
        body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.into_body().into_data_stream()
}

#[tokio::test]
async fn test_stream_starts_with_full_map() {
    let ctx = common::test_context().await;
    let client = registered_client(&ctx, "alice", "laptop").await;

    let mut stream = open_stream(&ctx, &client).await;
    let mut buf = Vec::new();

    let frame = common::read_frame(&mut stream, &mut buf)
        .await
        .expect("initial frame");
    let map: MapResponse = client.open_to_machine(&ctx.state, &frame);
    assert!(!map.keep_alive);
    assert!(map.node.is_some());
}

#[tokio::test]
async fn test_stream_delivers_update_when_peer_joins() {
    let ctx = common::test_context().await;
    let a = registered_client(&ctx, "alice", "laptop").await;

    let mut stream = open_stream(&ctx, &a).await;
    let mut buf = Vec::new();

    let initial = common::read_frame(&mut stream, &mut buf).await.unwrap();
    let initial: MapResponse = a.open_to_machine(&ctx.state, &initial);
    assert!(initial.peers.is_empty());

    // a second node registering in the same namespace wakes the stream
    let _b = registered_client(&ctx, "alice", "desktop").await;

    let update = common::read_frame(&mut stream, &mut buf)
        .await
        .expect("update frame after peer joined");
    let update: MapResponse = a.open_to_machine(&ctx.state, &update);
    assert_eq!(update.peers.len(), 1);
    assert_eq!(update.peers[0].name, "desktop");
}

#[tokio::test]
async fn test_stream_delivers_update_when_peer_deleted() {
    let ctx = common::test_context().await;
    let a = registered_client(&ctx, "alice", "laptop").await;
    let b = registered_client(&ctx, "alice", "desktop").await;

    let mut stream = open_stream(&ctx, &a).await;
    let mut buf = Vec::new();

    let initial = common::read_frame(&mut stream, &mut buf).await.unwrap();
    let initial: MapResponse = a.open_to_machine(&ctx.state, &initial);
    assert_eq!(initial.peers.len(), 1);

    // operator deletes b: a's stream must emit a map without it
    let node_b = ctx
        .state
        .db
        .get_node_by_node_key(&b.node_key())
        .await
        .unwrap()
        .unwrap();
    ctx.state.db.delete_node(node_b.id).await.unwrap();
    ctx.state.state_updated(Some(&node_b)).await;

    let update = common::read_frame(&mut stream, &mut buf)
        .await
        .expect("update frame after peer deletion");
    let update: MapResponse = a.open_to_machine(&ctx.state, &update);
    assert!(update.peers.is_empty());

    // the delivery advanced the node past the deletion's epoch
    let node_a = ctx
        .state
        .db
        .get_node_by_node_key(&a.node_key())
        .await
        .unwrap()
        .unwrap();
    assert!(!node_a.is_outdated(ctx.state.broadcaster.last_change()));
}

#[tokio::test]
async fn test_keepalive_updates_last_seen_only() {
    let mut config = Config::default();
    config.tuning.keepalive_interval_secs = 1;
    // long freshness interval so only keep-alives fire
    config.tuning.update_check_interval_secs = 3600;
    let ctx = common::test_context_with(config, Default::default()).await;
    let client = registered_client(&ctx, "alice", "laptop").await;

    let mut stream = open_stream(&ctx, &client).await;
    let mut buf = Vec::new();

    // initial full map stamps last_successful_update
    common::read_frame(&mut stream, &mut buf).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let before = ctx
        .state
        .db
        .get_node_by_node_key(&client.node_key())
        .await
        .unwrap()
        .unwrap();
    let update_stamp = before.last_successful_update.expect("stamped by initial map");

    let frame = common::read_frame(&mut stream, &mut buf)
        .await
        .expect("keep-alive frame");
    let keepalive: MapResponse = client.open_to_machine(&ctx.state, &frame);
    assert!(keepalive.keep_alive);
    assert!(keepalive.node.is_none());
    assert!(keepalive.peers.is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let after = ctx
        .state
        .db
        .get_node_by_node_key(&client.node_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        after.last_successful_update.unwrap(),
        update_stamp,
        "keep-alives must not advance last_successful_update"
    );
    assert!(
        after.last_seen.unwrap() >= before.last_seen.unwrap(),
        "keep-alives update last_seen"
    );
}

#[tokio::test]
async fn test_freshness_tick_catches_missed_signal() {
    let mut config = Config::default();
    config.tuning.keepalive_interval_secs = 0;
    config.tuning.update_check_interval_secs = 1;
    let ctx = common::test_context_with(config, Default::default()).await;
    let a = registered_client(&ctx, "alice", "laptop").await;

    let _b = registered_client(&ctx, "alice", "desktop").await;

    let mut stream = open_stream(&ctx, &a).await;
    let mut buf = Vec::new();
    common::read_frame(&mut stream, &mut buf).await.unwrap();

    // advance the epoch without signalling the channel: only the
    // freshness ticker can notice
    ctx.state.broadcaster.advance();

    let update = common::read_frame(&mut stream, &mut buf)
        .await
        .expect("freshness tick should trigger a map");
    let update: MapResponse = a.open_to_machine(&ctx.state, &update);
    assert_eq!(update.peers.len(), 1);
}

#[tokio::test]
async fn test_disconnect_unregisters_channel() {
    let ctx = common::test_context().await;
    let client = registered_client(&ctx, "alice", "laptop").await;

    {
        let mut stream = open_stream(&ctx, &client).await;
        let mut buf = Vec::new();
        common::read_frame(&mut stream, &mut buf).await.unwrap();
        assert_eq!(ctx.state.broadcaster.channel_count().await, 1);
        // stream dropped here: the client went away
    }

    // teardown runs on the runtime; give it a moment
    for _ in 0..50 {
        if ctx.state.broadcaster.channel_count().await == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(ctx.state.broadcaster.channel_count().await, 0);
}

#[tokio::test]
async fn test_ephemeral_node_scheduled_on_disconnect() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, true).await;
    let client = TestClient::new();
    common::register_via_http(
        &ctx,
        &client,
        &auth_key_register_request(&client, &secret, "ephemeral"),
    )
    .await;

    {
        let mut stream = open_stream(&ctx, &client).await;
        let mut buf = Vec::new();
        common::read_frame(&mut stream, &mut buf).await.unwrap();
    }

    for _ in 0..50 {
        if ctx.state.ephemeral_gc.scheduled_count().await == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(ctx.state.ephemeral_gc.scheduled_count().await, 1);
}
