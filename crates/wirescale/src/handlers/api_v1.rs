//! admin rest api.
//!
//! unary operations over namespaces, pre-auth keys, nodes and api keys,
//! authorised by [`AdminAuth`]. the operator cli's pairing command also
//! lands here because the pending-registration cache is process-local to
//! the server.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::info;
use wirescale_db::Database;
use wirescale_types::{
    ApiKey, AuthKeyToken, Namespace, NamespaceId, Node, NodeId, PreAuthKey, RegisterMethod,
};

use super::api_auth::AdminAuth;
use super::{ApiError, OptionExt, ResultExt};
use crate::{AppState, registration};

/// build the `/api/v1` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/namespace", post(create_namespace).get(list_namespaces))
        .route("/namespace/{name}", delete(delete_namespace))
        .route("/preauthkey", post(create_preauth_key).get(list_preauth_keys))
        .route("/preauthkey/expire", post(expire_preauth_key))
        .route("/node", get(list_nodes))
        .route("/node/register", post(register_pending_node))
        .route("/node/{id}", delete(delete_node))
        .route("/node/{id}/expire", post(expire_node))
        .route("/node/{id}/routes", post(set_node_routes))
        .route("/apikey", post(create_api_key).get(list_api_keys))
        .route("/apikey/expire", post(expire_api_key))
}

// namespaces

#[derive(Debug, Deserialize)]
struct CreateNamespaceRequest {
    name: String,
}

async fn create_namespace(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Json(req): Json<CreateNamespaceRequest>,
) -> Result<Json<Namespace>, ApiError> {
    let ns = Namespace::new(NamespaceId(0), req.name)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if state
        .db
        .get_namespace_by_name(&ns.name)
        .await
        .map_internal()?
        .is_some()
    {
        return Err(ApiError::bad_request("namespace already exists"));
    }
    let created = state.db.create_namespace(&ns).await.map_internal()?;
    info!(namespace = %created.name, "created namespace");
    Ok(Json(created))
}

async fn list_namespaces(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
) -> Result<Json<Vec<Namespace>>, ApiError> {
    Ok(Json(state.db.list_namespaces().await.map_internal()?))
}

async fn delete_namespace(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ns = state
        .db
        .get_namespace_by_name(&name)
        .await
        .map_internal()?
        .or_not_found("namespace not found")?;

    let nodes = state.db.list_nodes_in_namespace(ns.id).await.map_internal()?;
    if !nodes.is_empty() {
        return Err(ApiError::bad_request("namespace still has nodes"));
    }

    state.db.delete_namespace(ns.id).await.map_internal()?;
    state.state_updated(None).await;
    Ok(Json(serde_json::json!({"deleted": name})))
}

// pre-auth keys

#[derive(Debug, Deserialize)]
struct CreatePreAuthKeyRequest {
    namespace: String,
    #[serde(default)]
    reusable: bool,
    #[serde(default)]
    ephemeral: bool,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CreatePreAuthKeyResponse {
    /// the full secret; shown exactly once.
    key: String,
    #[serde(flatten)]
    record: PreAuthKey,
}

async fn create_preauth_key(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Json(req): Json<CreatePreAuthKeyRequest>,
) -> Result<Json<CreatePreAuthKeyResponse>, ApiError> {
    let ns = state
        .db
        .get_namespace_by_name(&req.namespace)
        .await
        .map_internal()?
        .or_not_found("namespace not found")?;

    let token = AuthKeyToken::generate();
    let mut key = PreAuthKey::from_token(0, &token, ns.id);
    key.reusable = req.reusable;
    key.ephemeral = req.ephemeral;
    key.expiration = req.expiration;

    let record = state.db.create_preauth_key(&key).await.map_internal()?;
    info!(namespace = %ns.name, prefix = %record.key_prefix, "created pre-auth key");
    Ok(Json(CreatePreAuthKeyResponse {
        key: token.to_string(),
        record,
    }))
}

#[derive(Debug, Deserialize)]
struct ListPreAuthKeysQuery {
    namespace: String,
}

async fn list_preauth_keys(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    axum::extract::Query(query): axum::extract::Query<ListPreAuthKeysQuery>,
) -> Result<Json<Vec<PreAuthKey>>, ApiError> {
    let ns = state
        .db
        .get_namespace_by_name(&query.namespace)
        .await
        .map_internal()?
        .or_not_found("namespace not found")?;
    Ok(Json(state.db.list_preauth_keys(ns.id).await.map_internal()?))
}

#[derive(Debug, Deserialize)]
struct ExpirePreAuthKeyRequest {
    prefix: String,
}

async fn expire_preauth_key(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Json(req): Json<ExpirePreAuthKeyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = state
        .db
        .get_preauth_key_by_prefix(&req.prefix)
        .await
        .map_internal()?
        .or_not_found("pre-auth key not found")?;
    state.db.expire_preauth_key(key.id).await.map_internal()?;
    Ok(Json(serde_json::json!({"expired": req.prefix})))
}

// nodes

async fn list_nodes(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
) -> Result<Json<Vec<Node>>, ApiError> {
    Ok(Json(state.db.list_nodes().await.map_internal()?))
}

#[derive(Debug, Deserialize)]
struct RegisterPendingRequest {
    token: String,
    namespace: String,
}

/// complete a pending interactive registration (the cli pairing path).
async fn register_pending_node(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Json(req): Json<RegisterPendingRequest>,
) -> Result<Json<Node>, ApiError> {
    let pending = state
        .pending_registrations
        .take(&req.token)
        .or_not_found("registration not found or expired")?;
    state.pending_by_machine.remove(&pending.machine_key.to_hex());

    let ns = state
        .db
        .get_namespace_by_name(&req.namespace)
        .await
        .map_internal()?
        .or_not_found("namespace not found")?;

    let node = registration::create_node(
        &state,
        registration::NewNode {
            machine_key: pending.machine_key.clone(),
            node_key: pending.node_key.clone(),
            hostinfo: pending.hostinfo.clone(),
            expiry: pending.expiry,
            namespace_id: ns.id,
            register_method: RegisterMethod::Cli,
            auth_key_id: None,
            ephemeral: false,
        },
    )
    .await
    .map_internal()?;

    state.state_updated(Some(&node)).await;
    Ok(Json(node))
}

async fn delete_node(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let node = state
        .db
        .get_node(NodeId(id))
        .await
        .map_internal()?
        .or_not_found("node not found")?;

    registration::delete_node(&state, &node).await.map_internal()?;
    state.state_updated(Some(&node)).await;
    info!(node_id = id, "deleted node");
    Ok(Json(serde_json::json!({"deleted": id})))
}

async fn expire_node(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let node = state
        .db
        .get_node(NodeId(id))
        .await
        .map_internal()?
        .or_not_found("node not found")?;

    state
        .db
        .expire_node(node.id, Some(Utc::now()))
        .await
        .map_internal()?;
    state.state_updated(Some(&node)).await;
    Ok(Json(serde_json::json!({"expired": id})))
}

#[derive(Debug, Deserialize)]
struct SetRoutesRequest {
    routes: Vec<IpNet>,
}

/// enable a subset of a node's advertised routes.
async fn set_node_routes(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Path(id): Path<u64>,
    Json(req): Json<SetRoutesRequest>,
) -> Result<Json<Node>, ApiError> {
    let mut node = state
        .db
        .get_node(NodeId(id))
        .await
        .map_internal()?
        .or_not_found("node not found")?;

    let advertised = node.advertised_routes();
    if let Some(unknown) = req.routes.iter().find(|r| !advertised.contains(r)) {
        return Err(ApiError::bad_request(format!(
            "route {unknown} is not advertised by the node"
        )));
    }

    node.enabled_routes = req.routes;
    let node = state.db.update_node(&node).await.map_internal()?;
    state.state_updated(Some(&node)).await;
    Ok(Json(node))
}

// api keys

#[derive(Debug, Deserialize, Default)]
struct CreateApiKeyRequest {
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CreateApiKeyResponse {
    /// the full `prefix.secret`; shown exactly once.
    key: String,
    #[serde(flatten)]
    record: ApiKey,
}

async fn create_api_key(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, ApiError> {
    let (key, full) = ApiKey::generate(0, req.expiration).map_err(ApiError::internal)?;
    let record = state.db.create_api_key(&key).await.map_internal()?;
    Ok(Json(CreateApiKeyResponse { key: full, record }))
}

async fn list_api_keys(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
) -> Result<Json<Vec<ApiKey>>, ApiError> {
    Ok(Json(state.db.list_api_keys().await.map_internal()?))
}

#[derive(Debug, Deserialize)]
struct ExpireApiKeyRequest {
    prefix: String,
}

async fn expire_api_key(
    State(state): State<AppState>,
    AdminAuth(_key): AdminAuth,
    Json(req): Json<ExpireApiKeyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = state
        .db
        .get_api_key_by_prefix(&req.prefix)
        .await
        .map_internal()?
        .or_not_found("api key not found")?;
    state.db.expire_api_key(key.id).await.map_internal()?;
    Ok(Json(serde_json::json!({"expired": req.prefix})))
}
