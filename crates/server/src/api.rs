use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::auth::Authorized;
use crate::collector::{CycleMetadata, CycleOutcome};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── History ───────────────────────────────────────────────────────

/// Full history snapshot. 404 with an empty history until the first record arrives.
pub async fn history(State(state): State<Arc<AppState>>, _auth: Authorized) -> Response {
    let snapshot = state.store.read().await.snapshot();

    if snapshot.history.is_empty() {
        return (StatusCode::NOT_FOUND, Json(snapshot)).into_response();
    }

    info!(records = snapshot.history.len(), "serving history to authenticated client");
    Json(snapshot).into_response()
}

// ── Liveness ──────────────────────────────────────────────────────

pub async fn ping() -> &'static str {
    "pong"
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub records: usize,
    pub history_cap: usize,
    pub latest_issue: Option<String>,
    pub poll_interval_secs: u64,
    pub cycle_running: bool,
    pub cycle: CycleMetadata,
}

/// Unauthenticated health view. Carries counters only, never records.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (records, history_cap, latest_issue) = {
        let store = state.store.read().await;
        (
            store.len(),
            store.cap(),
            store.latest().map(|r| r.key().to_string()),
        )
    };

    Json(StatusResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        records,
        history_cap,
        latest_issue,
        poll_interval_secs: state.poll_interval_secs,
        cycle_running: state.collector.is_running(),
        cycle: state.collector.metadata().await,
    })
}

// ── Manual trigger ────────────────────────────────────────────────

/// Run a collection cycle now, subject to the same one-at-a-time rule as the timer.
///
/// The cycle runs in its own task so a client that disconnects mid-request
/// cannot cancel it halfway.
pub async fn collect(State(state): State<Arc<AppState>>, _auth: Authorized) -> Response {
    info!("manual collection cycle requested");
    let cycle = tokio::spawn({
        let collector = state.collector.clone();
        async move { collector.run_cycle().await }
    });

    let outcome = match cycle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "manual collection task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Collection cycle aborted".to_string(),
                }),
            )
                .into_response();
        }
    };

    match outcome {
        CycleOutcome::Completed { .. } => Json(outcome).into_response(),
        CycleOutcome::Failed { .. } => (StatusCode::BAD_GATEWAY, Json(outcome)).into_response(),
        CycleOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Collection cycle already running".to_string(),
            }),
        )
            .into_response(),
    }
}
