//! handler for `/machine/:mkey/register`.
//!
//! implements the registration state machine keyed on
//! (machine_key, node_key):
//!
//! - unknown machine, auth key in body: validate and create the node
//! - unknown machine, no auth key: park a pending registration and hand
//!   back an auth url for the operator or idp to complete
//! - known machine, same node key: refresh
//! - known machine, different node key: rotation, gated on the old key

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use tracing::{debug, info};
use wirescale_db::Database;
use wirescale_proto::{LoginInfo, RegisterRequest, RegisterResponse, UserInfo};
use wirescale_types::{AuthKeyToken, MachineKey, Namespace, Node, PreAuthKey, RegisterMethod};

use super::{ApiError, OptionExt, ResultExt};
use crate::reg_cache::{self, PendingRegistration};
use crate::{AppState, registration};

/// seal a register response to the node key and wrap it for http.
fn sealed_response(
    state: &AppState,
    node_key: &wirescale_types::NodeKey,
    response: &RegisterResponse,
) -> Result<Response, ApiError> {
    let sealed = wirescale_proto::seal(&state.keypair, node_key.as_bytes(), response)
        .map_err(|e| ApiError::internal(e))?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(sealed))
        .map_err(|e| ApiError::internal(e))
}

/// render the namespace blocks of a successful response.
fn authorized_response(namespace: &Namespace, method: RegisterMethod) -> RegisterResponse {
    RegisterResponse {
        user: UserInfo {
            id: namespace.id.0,
            display_name: namespace.name.clone(),
        },
        login: LoginInfo {
            id: namespace.id.0,
            provider: method.as_str().to_string(),
            login_name: namespace.name.clone(),
            display_name: namespace.name.clone(),
        },
        node_key_expired: false,
        machine_authorized: true,
        auth_url: String::new(),
        error: String::new(),
    }
}

/// handle node registration.
pub async fn register(
    State(state): State<AppState>,
    Path(mkey): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let machine_key =
        MachineKey::from_hex(&mkey).map_err(|_| ApiError::bad_request("invalid machine key"))?;

    // the body is sealed with the machine-key/server box; a failed open
    // means the caller does not hold the private half of the key in the url
    let plaintext = state
        .keypair
        .open(machine_key.as_bytes(), &body)
        .map_err(|_| ApiError::unauthorized("bad_seal"))?;
    let req: RegisterRequest = serde_json::from_slice(&plaintext)
        .map_err(|_| ApiError::bad_request("invalid register request"))?;

    debug!(
        machine_key = %machine_key.short_string(),
        node_key = %req.node_key.short_string(),
        "register request"
    );

    let existing = state
        .db
        .get_node_by_machine_key(&machine_key)
        .await
        .map_internal()?;

    let auth_key = req
        .auth
        .as_ref()
        .map(|a| a.auth_key.clone())
        .unwrap_or_default();

    match existing {
        None if !auth_key.is_empty() => {
            register_with_auth_key(&state, machine_key, req, &auth_key).await
        }
        None => pending_response(&state, machine_key, req),
        Some(node) if node.node_key == req.node_key => refresh(&state, node, req).await,
        Some(node) => rotate(&state, node, req, &auth_key).await,
    }
}

/// validate a presented pre-auth key and look up its record.
async fn validate_auth_key(state: &AppState, presented: &str) -> Result<PreAuthKey, ApiError> {
    let token: AuthKeyToken = presented
        .parse()
        .map_err(|_| ApiError::unauthorized("invalid_auth_key"))?;

    let key = state
        .db
        .get_preauth_key_by_prefix(token.prefix())
        .await
        .map_internal()?
        .or_unauthorized("invalid_auth_key")?;

    if !key.verify(&token) || !key.is_valid() {
        return Err(ApiError::unauthorized("invalid_auth_key"));
    }
    Ok(key)
}

/// unknown machine presenting a pre-auth key: create the node.
async fn register_with_auth_key(
    state: &AppState,
    machine_key: MachineKey,
    req: RegisterRequest,
    presented: &str,
) -> Result<Response, ApiError> {
    let key = validate_auth_key(state, presented).await?;

    let namespace = state
        .db
        .get_namespace(key.namespace_id)
        .await
        .map_internal()?
        .or_unauthorized("invalid_auth_key")?;

    let node = registration::create_node(
        state,
        registration::NewNode {
            machine_key,
            node_key: req.node_key.clone(),
            hostinfo: req.hostinfo,
            expiry: req.expiry,
            namespace_id: namespace.id,
            register_method: RegisterMethod::AuthKey,
            auth_key_id: Some(key.id),
            ephemeral: key.ephemeral,
        },
    )
    .await
    .map_internal()?;

    if !key.reusable {
        state.db.mark_preauth_key_used(key.id).await.map_internal()?;
    }

    state.state_updated(Some(&node)).await;
    sealed_response(state, &req.node_key, &authorized_response(&namespace, RegisterMethod::AuthKey))
}

/// unknown machine without credentials: park it and return an auth url.
fn pending_response(
    state: &AppState,
    machine_key: MachineKey,
    req: RegisterRequest,
) -> Result<Response, ApiError> {
    let token = reg_cache::generate_token();
    let machine_key_hex = machine_key.to_hex();
    let pending = Arc::new(PendingRegistration {
        machine_key,
        node_key: req.node_key.clone(),
        hostinfo: req.hostinfo.clone(),
        expiry: req.expiry,
    });
    state.pending_registrations.put(token.clone(), pending);
    state
        .pending_by_machine
        .put(machine_key_hex.clone(), token.clone());

    let server = state.config.server_url.trim_end_matches('/');
    let auth_url = if state.oidc.is_some() {
        format!("{server}/oidc/register/{machine_key_hex}")
    } else {
        format!("{server}/register/{token}")
    };

    info!(machine_key = &machine_key_hex[..8.min(machine_key_hex.len())], "registration pending operator action");

    sealed_response(
        state,
        &req.node_key,
        &RegisterResponse {
            machine_authorized: false,
            auth_url,
            ..Default::default()
        },
    )
}

/// known machine re-presenting its current node key: refresh.
///
/// the stored expiry is only moved when the client asked for an earlier
/// one; a refresh can shorten a registration but never stretch it.
async fn refresh(
    state: &AppState,
    mut node: Node,
    req: RegisterRequest,
) -> Result<Response, ApiError> {
    if let Some(requested) = req.expiry {
        let earlier = node.expiry.is_none_or(|current| requested < current);
        if earlier {
            node.expiry = Some(requested);
            node = state.db.update_node(&node).await.map_internal()?;
            state.state_updated(Some(&node)).await;
        }
    }

    let namespace = state
        .db
        .get_namespace(node.namespace_id)
        .await
        .map_internal()?
        .or_unauthorized("unknown_machine")?;
    sealed_response(
        state,
        &req.node_key,
        &authorized_response(&namespace, node.register_method),
    )
}

/// known machine presenting a new node key: rotation.
///
/// the swap is accepted only when the request's old key matches the
/// stored one; otherwise the node must re-authorize via auth key or the
/// interactive path. a failed rotation leaves the record unchanged.
async fn rotate(
    state: &AppState,
    mut node: Node,
    req: RegisterRequest,
    auth_key: &str,
) -> Result<Response, ApiError> {
    let old_key_matches = !req.old_node_key.is_zero() && req.old_node_key == node.node_key;

    if old_key_matches {
        node.node_key = req.node_key.clone();
        let node = state.db.update_node(&node).await.map_internal()?;
        state.state_updated(Some(&node)).await;
        info!(node_id = node.id.0, "rotated node key");

        let namespace = state
            .db
            .get_namespace(node.namespace_id)
            .await
            .map_internal()?
            .or_unauthorized("unknown_machine")?;
        return sealed_response(
            state,
            &req.node_key,
            &authorized_response(&namespace, node.register_method),
        );
    }

    if !auth_key.is_empty() {
        // no usable old key, but a fresh credential re-authorizes the swap
        let key = validate_auth_key(state, auth_key).await?;
        node.node_key = req.node_key.clone();
        node.auth_key_id = Some(key.id);
        let node = state.db.update_node(&node).await.map_internal()?;
        if !key.reusable {
            state.db.mark_preauth_key_used(key.id).await.map_internal()?;
        }
        state.state_updated(Some(&node)).await;

        let namespace = state
            .db
            .get_namespace(node.namespace_id)
            .await
            .map_internal()?
            .or_unauthorized("unknown_machine")?;
        return sealed_response(
            state,
            &req.node_key,
            &authorized_response(&namespace, node.register_method),
        );
    }

    // neither path authorizes the new key: back through interactive auth
    pending_response(state, node.machine_key.clone(), req)
}
