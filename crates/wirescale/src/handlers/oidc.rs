//! oidc hand-off handlers.
//!
//! `/oidc/register/:mkey` parks the machine key under a fresh state token
//! and bounces the browser to the idp; `/oidc/callback` consumes the
//! token, verifies the id token and binds the machine to the namespace
//! derived from the authenticated email.

use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use tracing::{info, warn};
use wirescale_db::Database;
use wirescale_types::{MachineKey, Namespace, NamespaceId, RegisterMethod};

use super::{ApiError, ResultExt, templates};
use crate::oidc::{namespace_from_email, validate_claims};
use crate::reg_cache::{self, OidcState};
use crate::{AppState, registration};

/// get /oidc/register/:mkey - start the browser flow.
pub async fn oidc_register(
    State(state): State<AppState>,
    Path(mkey): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::not_found("oidc is not configured"))?;

    // only well-formed machine keys get parked in the cache
    MachineKey::from_hex(&mkey).map_err(|_| ApiError::bad_request("invalid machine key"))?;

    let token = reg_cache::generate_token();
    let (url, nonce) = provider.authorization_url(token.clone());
    state.oidc_states.put(
        token,
        OidcState {
            machine_key_hex: mkey,
            nonce,
        },
    );

    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

/// get /oidc/callback - complete the browser flow.
pub async fn oidc_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<String>, ApiError> {
    let provider = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::not_found("oidc is not configured"))?
        .clone();

    let (Some(code), Some(state_param)) = (params.code, params.state) else {
        return Err(ApiError::bad_request("Wrong params"));
    };

    // consume the state token first: a replayed callback must fail even
    // when the rest of the exchange would succeed
    let oidc_state = state
        .oidc_states
        .take(&state_param)
        .ok_or_else(|| ApiError::bad_request("state has expired"))?;

    let claims = provider
        .exchange_and_verify(code, &oidc_state.nonce)
        .await
        .map_err(ApiError::bad_request)?;

    if let Err(reason) = validate_claims(provider.config(), &claims) {
        warn!(email = %claims.email, %reason, "rejected oidc principal");
        return Err(ApiError::unauthorized(reason));
    }

    let machine_key = MachineKey::from_hex(&oidc_state.machine_key_hex)
        .map_err(|_| ApiError::bad_request("could not parse machine key"))?;

    // a known machine is just re-authenticating: clear its expiry
    if let Some(node) = state
        .db
        .get_node_by_machine_key(&machine_key)
        .await
        .map_internal()?
    {
        state.db.expire_node(node.id, None).await.map_internal()?;
        state.state_updated(Some(&node)).await;
        info!(node_id = node.id.0, email = %claims.email, "reauthenticated node via oidc");
        return Ok(Html(templates::oidc_result_page(
            &claims.email,
            "Reauthenticated",
        )));
    }

    // new machine: it must have a pending registration from /machine/register
    let pending = state
        .pending_by_machine
        .take(&oidc_state.machine_key_hex)
        .and_then(|token| state.pending_registrations.take(&token))
        .ok_or_else(|| ApiError::bad_request("registration not found or expired"))?;

    let namespace_name =
        namespace_from_email(&claims.email, provider.config().strip_email_domain)
            .map_err(ApiError::internal)?;

    let namespace = match state
        .db
        .get_namespace_by_name(&namespace_name)
        .await
        .map_internal()?
    {
        Some(ns) => ns,
        None => {
            let ns = Namespace::new(NamespaceId(0), namespace_name).map_err(ApiError::internal)?;
            state.db.create_namespace(&ns).await.map_internal()?
        }
    };

    let node = registration::create_node(
        &state,
        registration::NewNode {
            machine_key,
            node_key: pending.node_key.clone(),
            hostinfo: pending.hostinfo.clone(),
            expiry: pending.expiry,
            namespace_id: namespace.id,
            register_method: RegisterMethod::Oidc,
            auth_key_id: None,
            ephemeral: false,
        },
    )
    .await
    .map_internal()?;

    state.state_updated(Some(&node)).await;
    info!(node_id = node.id.0, email = %claims.email, namespace = %namespace.name, "registered node via oidc");

    Ok(Html(templates::oidc_result_page(
        &claims.email,
        "Authenticated",
    )))
}
