//! tests for the /machine/:mkey/register endpoint.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{TestClient, auth_key_register_request, create_namespace, create_preauth_key};
use tower::ServiceExt;
use wirescale_db::Database;
use wirescale_proto::{RegisterRequest, RegisterResponse};

#[tokio::test]
async fn test_fresh_register_via_auth_key() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, record) = create_preauth_key(&ctx, &ns, false, false).await;

    let client = TestClient::new();
    let request = auth_key_register_request(&client, &secret, "laptop");
    let response = common::register_via_http(&ctx, &client, &request).await;

    assert!(response.machine_authorized);
    assert_eq!(response.user.display_name, "alice");
    assert_eq!(response.login.provider, "authkey");

    // node exists with the first addresses from both prefixes
    let node = ctx
        .state
        .db
        .get_node_by_node_key(&client.node_key())
        .await
        .unwrap()
        .expect("node should be created");
    assert_eq!(node.namespace_id, ns.id);
    assert_eq!(node.given_name, "laptop");
    assert_eq!(node.ipv4.unwrap().to_string(), "100.64.0.1");
    assert_eq!(node.ipv6.unwrap().to_string(), "fd7a:115c:a1e0::1");

    // the one-shot key is consumed
    let key = ctx
        .state
        .db
        .get_preauth_key_by_prefix(&record.key_prefix)
        .await
        .unwrap()
        .unwrap();
    assert!(key.used);
}

#[tokio::test]
async fn test_one_shot_key_rejected_on_second_use() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, false).await;

    let first = TestClient::new();
    common::register_via_http(&ctx, &first, &auth_key_register_request(&first, &secret, "one"))
        .await;

    // a different machine presenting the used key is rejected
    let second = TestClient::new();
    let body = second.seal(
        &ctx.state,
        &auth_key_register_request(&second, &secret, "two"),
    );
    let response = common::post_machine(
        &ctx.app,
        &format!("/machine/{}/register", second.machine_key_hex()),
        body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let text = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&text[..], b"invalid_auth_key");
}

#[tokio::test]
async fn test_reusable_key_registers_many() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, true, false).await;

    for hostname in ["one", "two", "three"] {
        let client = TestClient::new();
        let response = common::register_via_http(
            &ctx,
            &client,
            &auth_key_register_request(&client, &secret, hostname),
        )
        .await;
        assert!(response.machine_authorized, "{hostname} should register");
    }
    assert_eq!(ctx.state.db.list_nodes().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_machine_without_auth_gets_auth_url() {
    let ctx = common::test_context().await;
    let client = TestClient::new();

    let request = RegisterRequest {
        node_key: client.node_key(),
        ..Default::default()
    };
    let response = common::register_via_http(&ctx, &client, &request).await;

    assert!(!response.machine_authorized);
    assert!(
        response.auth_url.contains("/register/"),
        "auth_url should point at the pairing page, got {}",
        response.auth_url
    );

    // the pairing page renders for the token in the url
    let token = response.auth_url.rsplit('/').next().unwrap().to_string();
    let page = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/register/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_known_machine_same_node_key_is_refresh() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, false).await;

    let client = TestClient::new();
    common::register_via_http(&ctx, &client, &auth_key_register_request(&client, &secret, "x"))
        .await;

    // same machine, same node key, no credentials: still authorized
    let request = RegisterRequest {
        node_key: client.node_key(),
        ..Default::default()
    };
    let response = common::register_via_http(&ctx, &client, &request).await;
    assert!(response.machine_authorized);
    assert!(response.auth_url.is_empty());
}

#[tokio::test]
async fn test_refresh_can_shorten_but_not_extend_expiry() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, false).await;

    let client = TestClient::new();
    common::register_via_http(&ctx, &client, &auth_key_register_request(&client, &secret, "x"))
        .await;

    let soon = chrono::Utc::now() + chrono::Duration::hours(1);
    let request = RegisterRequest {
        node_key: client.node_key(),
        expiry: Some(soon),
        ..Default::default()
    };
    common::register_via_http(&ctx, &client, &request).await;

    let node = ctx
        .state
        .db
        .get_node_by_node_key(&client.node_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.expiry.unwrap().timestamp(), soon.timestamp());

    // a later expiry does not stretch the registration
    let later = chrono::Utc::now() + chrono::Duration::hours(48);
    let request = RegisterRequest {
        node_key: client.node_key(),
        expiry: Some(later),
        ..Default::default()
    };
    common::register_via_http(&ctx, &client, &request).await;

    let node = ctx
        .state
        .db
        .get_node_by_node_key(&client.node_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.expiry.unwrap().timestamp(), soon.timestamp());
}

#[tokio::test]
async fn test_rotation_with_matching_old_key() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, false).await;

    let client = TestClient::new();
    common::register_via_http(&ctx, &client, &auth_key_register_request(&client, &secret, "x"))
        .await;
    let old_node_key = client.node_key();

    // rotate: new node key, old one presented as proof
    let rotated = TestClient {
        machine: client.machine.clone(),
        node: wirescale_proto::ServerKeypair::generate(),
    };
    let request = RegisterRequest {
        node_key: rotated.node_key(),
        old_node_key: old_node_key.clone(),
        ..Default::default()
    };
    let response = common::register_via_http(&ctx, &rotated, &request).await;
    assert!(response.machine_authorized);

    // the stored key swapped atomically
    assert!(
        ctx.state
            .db
            .get_node_by_node_key(&old_node_key)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        ctx.state
            .db
            .get_node_by_node_key(&rotated.node_key())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_rotation_with_mismatched_old_key_leaves_record() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, false).await;

    let client = TestClient::new();
    common::register_via_http(&ctx, &client, &auth_key_register_request(&client, &secret, "x"))
        .await;

    let rotated = TestClient {
        machine: client.machine.clone(),
        node: wirescale_proto::ServerKeypair::generate(),
    };
    let wrong_old = wirescale_proto::ServerKeypair::generate();
    let request = RegisterRequest {
        node_key: rotated.node_key(),
        old_node_key: wirescale_types::NodeKey::from_bytes(wrong_old.public_bytes().to_vec()),
        ..Default::default()
    };
    let response = common::register_via_http(&ctx, &rotated, &request).await;

    // re-authorization required, record unchanged
    assert!(!response.machine_authorized);
    assert!(!response.auth_url.is_empty());
    assert!(
        ctx.state
            .db
            .get_node_by_node_key(&client.node_key())
            .await
            .unwrap()
            .is_some(),
        "the stored node key must be unchanged"
    );
}

#[tokio::test]
async fn test_garbage_body_is_unauthorized() {
    let ctx = common::test_context().await;
    let client = TestClient::new();

    // a body not sealed to the server fails to open
    let response = common::post_machine(
        &ctx.app,
        &format!("/machine/{}/register", client.machine_key_hex()),
        vec![0u8; 64],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_machine_key_is_bad_request() {
    let ctx = common::test_context().await;
    let response =
        common::post_machine(&ctx.app, "/machine/not-hex/register", vec![0u8; 64]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_response_is_sealed_to_node_key() {
    let ctx = common::test_context().await;
    let ns = create_namespace(&ctx, "alice").await;
    let (secret, _) = create_preauth_key(&ctx, &ns, false, false).await;

    let client = TestClient::new();
    let body = client.seal(
        &ctx.state,
        &auth_key_register_request(&client, &secret, "laptop"),
    );
    let response = common::post_machine(
        &ctx.app,
        &format!("/machine/{}/register", client.machine_key_hex()),
        body,
    )
    .await;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    // opening with the machine key must fail; the node key must work
    let with_machine: Result<RegisterResponse, _> = wirescale_proto::open(
        &client.machine,
        &ctx.state.keypair.public_bytes(),
        &bytes,
    );
    assert!(with_machine.is_err());
    let with_node: RegisterResponse = client.open_to_node(&ctx.state, &bytes);
    assert!(with_node.machine_authorized);
}
