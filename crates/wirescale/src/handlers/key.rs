//! handler for the `/key` endpoint.

use axum::extract::State;
use tracing::debug;

use crate::AppState;

/// get /key - the server's long-term public key as bare hex.
///
/// nodes fetch this once and seal every subsequent machine request to it.
pub async fn key(State(state): State<AppState>) -> String {
    let public_hex = state.keypair.public_hex();
    debug!(key_prefix = &public_hex[..8.min(public_hex.len())], "serving public key");
    public_hex
}
