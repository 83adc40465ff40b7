use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use collector_storage::HistoryStore;

use crate::collector::Collector;

/// The history store, shared by the collection cycle (writer) and the gateway (reader).
pub type SharedStore = Arc<RwLock<HistoryStore>>;

pub struct AppState {
    pub store: SharedStore,
    pub collector: Arc<Collector>,
    /// Expected `X-API-Key`; `None` means the server is misconfigured.
    pub api_key: Option<String>,
    pub cors_origin: String,
    pub poll_interval_secs: u64,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        collector: Arc<Collector>,
        api_key: Option<String>,
        cors_origin: impl Into<String>,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            store,
            collector,
            api_key,
            cors_origin: cors_origin.into(),
            poll_interval_secs,
            started_at: Utc::now(),
        }
    }
}
