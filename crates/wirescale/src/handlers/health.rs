//! health check endpoint.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::json;
use wirescale_db::Database;

use crate::AppState;

/// get /health - database connectivity check.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "pass"}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "fail", "error": e.to_string()})),
        ),
    }
}
