//! bearer authentication for the admin rest api.
//!
//! callers present `Authorization: Bearer <prefix>.<secret>`; the prefix
//! selects the stored key and the secret is checked against its bcrypt
//! hash.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use wirescale_db::Database;
use wirescale_types::ApiKey;

use super::ApiError;
use crate::AppState;

/// extractor proving the request carries a valid admin api key.
pub struct AdminAuth(pub ApiKey);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        let bearer = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("expected bearer authorization"))?;

        let (prefix, secret) =
            ApiKey::split(bearer).map_err(|_| ApiError::unauthorized("invalid api key"))?;

        let key = state
            .db
            .get_api_key_by_prefix(prefix)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::unauthorized("invalid api key"))?;

        if key.is_expired() || !key.verify(secret) {
            return Err(ApiError::unauthorized("invalid api key"));
        }

        let _ = state.db.touch_api_key(key.id).await;
        Ok(AdminAuth(key))
    }
}
