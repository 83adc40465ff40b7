//! Server startup: store loading, shared state, and the serve loop.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use collector_connector::HttpGameSource;
use collector_core::Config;
use collector_storage::{CorruptPolicy, HistoryStore};

use crate::collector::{Collector, CycleOutcome};
use crate::router::build_router;
use crate::scheduler::run_scheduler;
use crate::state::AppState;

/// Open the history store described by `config`.
///
/// Fails if the data directory cannot be created, or if the history file is
/// unreadable and `policy` is [`CorruptPolicy::Fail`].
pub fn open_store(config: &Config, policy: CorruptPolicy) -> anyhow::Result<HistoryStore> {
    let storage = &config.storage;
    if storage.in_memory {
        info!(cap = storage.history_cap, "using in-memory history (not persisted)");
        return Ok(HistoryStore::in_memory(storage.history_cap));
    }

    std::fs::create_dir_all(&storage.data_dir).with_context(|| {
        format!("failed to create data directory {}", storage.data_dir.display())
    })?;

    let path = storage.history_path();
    HistoryStore::open(&path, storage.history_cap, policy).with_context(|| {
        format!(
            "failed to load history from {} (set DISCARD_CORRUPT_HISTORY=true to quarantine it and start empty)",
            path.display()
        )
    })
}

/// Build `AppState`: history store, upstream client and collector.
pub fn build_app_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let policy = CorruptPolicy::from_discard_flag(config.storage.discard_corrupt);
    let store = Arc::new(RwLock::new(open_store(config, policy)?));

    let source = HttpGameSource::new(config.source.clone())
        .context("failed to initialize upstream client")?;
    let collector = Arc::new(Collector::new(Arc::new(source), store.clone()));

    Ok(Arc::new(AppState::new(
        store,
        collector,
        config.auth.api_key.clone(),
        config.server.cors_origin.clone(),
        config.collector.poll_interval_secs,
    )))
}

pub async fn serve(config: &Config) -> anyhow::Result<()> {
    config.log_summary();
    let state = build_app_state(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_scheduler(
        state.collector.clone(),
        config.collector.poll_interval(),
        shutdown_rx,
    ));

    let app = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Collector listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Let an in-flight cycle finish its merge + persist before exiting.
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }

    info!("Collector shut down");
    Ok(())
}

/// Run a single cycle against the configured store and print the outcome.
pub async fn collect_once(config: &Config) -> anyhow::Result<()> {
    let state = build_app_state(config)?;
    let outcome = state.collector.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        CycleOutcome::Completed { .. } => Ok(()),
        CycleOutcome::Failed { reason } => bail!("collection cycle failed: {reason}"),
        CycleOutcome::Skipped => bail!("collection cycle skipped"),
    }
}

/// Print a summary of the persisted history, and the config it was opened
/// with, without modifying anything.
pub fn inspect(config: &Config) -> anyhow::Result<()> {
    let summary = inspect_summary(config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn inspect_summary(config: &Config) -> anyhow::Result<serde_json::Value> {
    let store = open_store(config, CorruptPolicy::Fail)?;
    Ok(serde_json::json!({
        "path": store.path(),
        "records": store.len(),
        "cap": store.cap(),
        "latest_issue": store.latest().map(|r| r.key().to_string()),
        "oldest_issue": store.oldest().map(|r| r.key().to_string()),
        "config": config.redacted_summary(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::for_profile("STARTUPTEST");
        config.storage.data_dir = dir.to_path_buf();
        config.storage.in_memory = false;
        config.auth.api_key = Some("hunter2".to_string());
        config
    }

    #[test]
    fn inspect_reports_history_and_redacted_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        std::fs::write(
            config.storage.history_path(),
            r#"{"history": [{"issueNumber": "12"}, {"issueNumber": "11"}]}"#,
        )
        .unwrap();

        let summary = inspect_summary(&config).unwrap();
        assert_eq!(summary["records"], serde_json::json!(2));
        assert_eq!(summary["latest_issue"], serde_json::json!("12"));
        assert_eq!(summary["oldest_issue"], serde_json::json!("11"));
        assert_eq!(summary["config"]["auth"]["configured"], serde_json::json!(true));
        assert!(!summary.to_string().contains("hunter2"));
    }

    #[test]
    fn inspect_refuses_corrupt_history() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        std::fs::write(config.storage.history_path(), "garbage").unwrap();

        assert!(inspect_summary(&config).is_err());
        assert!(config.storage.history_path().exists());
    }
}
