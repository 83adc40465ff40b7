//! HTTP router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::api;
use crate::auth::API_KEY_HEADER;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
///
/// The history is served on `/`, `/data` and `/game-data`; which one a
/// deployment uses is up to its consumer.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cors_origin);

    Router::new()
        .route("/", get(api::history))
        .route("/data", get(api::history))
        .route("/game-data", get(api::history))
        .route("/collect", post(api::collect))
        .route("/ping", get(api::ping))
        .route("/status", get(api::status))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
            .max_age(Duration::from_secs(60 * 60)),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS_ORIGIN, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}
