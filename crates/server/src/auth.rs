//! Shared-secret check for the data endpoints.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::api::ErrorResponse;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No secret configured on the server side.
    #[error("Server configuration error")]
    Missing,

    /// Header absent or wrong.
    #[error("Unauthorized")]
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Missing => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Invalid => StatusCode::UNAUTHORIZED,
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Check the presented `X-API-Key` against the configured secret.
///
/// Both sides are hashed before comparing so the time taken does not depend
/// on how many leading bytes match.
pub fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), AuthError> {
    let expected = expected.ok_or(AuthError::Missing)?;
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Invalid)?;

    if Sha256::digest(expected.as_bytes()) == Sha256::digest(presented.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::Invalid)
    }
}

/// Extractor that admits only requests carrying the configured API key.
pub struct Authorized;

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authorize(state.api_key.as_deref(), &parts.headers).map_err(|e| {
            let path = parts.uri.path();
            match e {
                AuthError::Missing => warn!(path, "rejecting request: INTERNAL_API_KEY not configured"),
                AuthError::Invalid => warn!(path, "rejecting request: bad or missing API key"),
            }
            e
        })?;
        Ok(Authorized)
    }
}
