//! the pairing page for pending interactive registrations.

use axum::{
    extract::{Path, State},
    response::Html,
};

use super::{ApiError, templates};
use crate::AppState;

/// get /register/:token - show the operator the pairing command.
pub async fn register_web(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    if state.pending_registrations.get(&token).is_none() {
        return Err(ApiError::not_found("registration not found or expired"));
    }
    Ok(Html(templates::pairing_page(&token)))
}
