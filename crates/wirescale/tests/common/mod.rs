//! shared fixtures for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use futures_util::StreamExt;
use tower::ServiceExt;
use wirescale::{AppState, create_app};
use wirescale_db::{Database, WirescaleDb};
use wirescale_policy::AclPolicy;
use wirescale_proto::{RegisterRequest, RegisterResponse, ServerKeypair};
use wirescale_types::{
    AuthKeyToken, Config, HostInfo, Namespace, NamespaceId, NodeKey, PreAuthKey,
};

/// a running test application plus handles into its state.
pub struct TestContext {
    pub state: AppState,
    pub app: Router,
}

/// build a context with the default test config and an empty policy.
pub async fn test_context() -> TestContext {
    test_context_with(Config::default(), AclPolicy::default()).await
}

/// build a context with a custom config and policy.
pub async fn test_context_with(mut config: Config, policy: AclPolicy) -> TestContext {
    config.database.db_type = "sqlite".to_string();
    let db = WirescaleDb::new_in_memory().await.unwrap();
    let keypair = ServerKeypair::generate();
    let state = AppState::new(db, config, policy, keypair, None)
        .await
        .unwrap();
    let app = create_app(state.clone());
    TestContext { state, app }
}

/// a client-side identity: machine keypair plus node keypair.
pub struct TestClient {
    pub machine: ServerKeypair,
    pub node: ServerKeypair,
}

impl TestClient {
    pub fn new() -> Self {
        Self {
            machine: ServerKeypair::generate(),
            node: ServerKeypair::generate(),
        }
    }

    pub fn machine_key_hex(&self) -> String {
        self.machine.public_hex()
    }

    pub fn node_key(&self) -> NodeKey {
        NodeKey::from_bytes(self.node.public_bytes().to_vec())
    }

    /// seal a value to the server using the machine key box.
    pub fn seal<T: serde::Serialize>(&self, state: &AppState, value: &T) -> Vec<u8> {
        wirescale_proto::seal(&self.machine, &state.keypair.public_bytes(), value).unwrap()
    }

    /// open a response the server sealed to the node key.
    pub fn open_to_node<T: serde::de::DeserializeOwned>(
        &self,
        state: &AppState,
        payload: &[u8],
    ) -> T {
        wirescale_proto::open(&self.node, &state.keypair.public_bytes(), payload).unwrap()
    }

    /// open a map frame the server sealed to the machine key.
    pub fn open_to_machine<T: serde::de::DeserializeOwned>(
        &self,
        state: &AppState,
        payload: &[u8],
    ) -> T {
        wirescale_proto::open(&self.machine, &state.keypair.public_bytes(), payload).unwrap()
    }
}

/// post a sealed body to a machine endpoint.
pub async fn post_machine(app: &Router, path: &str, body: Vec<u8>) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// create a namespace directly in the store.
pub async fn create_namespace(ctx: &TestContext, name: &str) -> Namespace {
    let ns = Namespace::new(NamespaceId(0), name).unwrap();
    ctx.state.db.create_namespace(&ns).await.unwrap()
}

/// create a pre-auth key; returns the full secret and the stored record.
pub async fn create_preauth_key(
    ctx: &TestContext,
    namespace: &Namespace,
    reusable: bool,
    ephemeral: bool,
) -> (String, PreAuthKey) {
    let token = AuthKeyToken::generate();
    let mut key = PreAuthKey::from_token(0, &token, namespace.id);
    key.reusable = reusable;
    key.ephemeral = ephemeral;
    let record = ctx.state.db.create_preauth_key(&key).await.unwrap();
    (token.to_string(), record)
}

/// build a register request carrying an auth key.
pub fn auth_key_register_request(client: &TestClient, auth_key: &str, hostname: &str) -> RegisterRequest {
    RegisterRequest {
        version: 28,
        node_key: client.node_key(),
        auth: Some(wirescale_proto::RegisterAuth {
            provider: String::new(),
            auth_key: auth_key.to_string(),
        }),
        hostinfo: Some(HostInfo {
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// register a node via the http endpoint and return the opened response.
pub async fn register_via_http(
    ctx: &TestContext,
    client: &TestClient,
    request: &RegisterRequest,
) -> RegisterResponse {
    let body = client.seal(&ctx.state, request);
    let response = post_machine(
        &ctx.app,
        &format!("/machine/{}/register", client.machine_key_hex()),
        body,
    )
    .await;
    assert_eq!(response.status(), 200, "register should succeed");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    client.open_to_node(&ctx.state, &bytes)
}

/// pull the next length-prefixed frame off a streaming body.
pub async fn read_frame(
    stream: &mut (impl futures_util::Stream<Item = Result<Bytes, axum::Error>> + Unpin),
    buf: &mut Vec<u8>,
) -> Option<Vec<u8>> {
    loop {
        if buf.len() >= 4 {
            let len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
            if buf.len() >= 4 + len {
                let frame = buf[4..4 + len].to_vec();
                buf.drain(..4 + len);
                return Some(frame);
            }
        }
        let chunk = tokio::time::timeout(Duration::from_secs(10), stream.next())
            .await
            .ok()??
            .ok()?;
        buf.extend_from_slice(&chunk);
    }
}

/// strip the length prefix off a one-shot map response body.
pub fn unframe(bytes: &[u8]) -> Vec<u8> {
    assert!(bytes.len() >= 4, "framed body too short");
    let len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), 4 + len, "frame length mismatch");
    bytes[4..].to_vec()
}
