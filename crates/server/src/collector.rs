//! One fetch + merge + persist cycle, with at most one cycle in flight.
//!
//! `Idle -> Running` on a timer tick or a manual trigger. `Running -> Idle`
//! always, whatever happened. A trigger that arrives while a cycle is running
//! is dropped, not queued.
//!
//! Every failure stays inside the cycle: it is logged and recorded in
//! [`CycleMetadata`], and the next tick starts fresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use collector_connector::{FetchError, GameSource};
use collector_storage::{MergeResult, StoreError};

use crate::state::SharedStore;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("store task failed: {0}")]
    StoreTask(#[from] JoinError),
}

/// Bookkeeping about past cycles, exposed on `/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleMetadata {
    /// End of the most recent cycle, successful or not.
    pub last_checked: Option<DateTime<Utc>>,
    /// End of the most recent successful cycle.
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Records added by the most recent successful cycle.
    pub last_added: usize,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub triggers_dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed {
        added: usize,
        evicted: usize,
        total: usize,
    },
    Failed {
        reason: String,
    },
    /// Another cycle was already running.
    Skipped,
}

/// Clears the busy flag when the cycle ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Collector {
    source: Arc<dyn GameSource>,
    store: SharedStore,
    metadata: RwLock<CycleMetadata>,
    running: AtomicBool,
}

impl Collector {
    pub fn new(source: Arc<dyn GameSource>, store: SharedStore) -> Self {
        Self {
            source,
            store,
            metadata: RwLock::new(CycleMetadata::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn metadata(&self) -> CycleMetadata {
        self.metadata.read().await.clone()
    }

    /// Run one cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_busy) = BusyGuard::acquire(&self.running) else {
            self.metadata.write().await.triggers_dropped += 1;
            warn!("collection cycle already running, trigger dropped");
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        let result = self.collect().await;
        let now = Utc::now();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut meta = self.metadata.write().await;
        meta.last_checked = Some(now);

        match result {
            Ok((merge, total)) => {
                meta.last_success = Some(now);
                meta.last_error = None;
                meta.last_added = merge.added;
                meta.cycles_completed += 1;

                if merge.added > 0 {
                    info!(
                        added = merge.added,
                        evicted = merge.evicted,
                        total,
                        elapsed_ms,
                        "collection cycle stored new results"
                    );
                } else {
                    debug!(total, elapsed_ms, "collection cycle found nothing new");
                }

                CycleOutcome::Completed {
                    added: merge.added,
                    evicted: merge.evicted,
                    total,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                meta.last_error = Some(reason.clone());
                meta.cycles_failed += 1;
                warn!(source = self.source.name(), error = %e, elapsed_ms, "collection cycle failed");
                CycleOutcome::Failed { reason }
            }
        }
    }

    async fn collect(&self) -> Result<(MergeResult, usize), CycleError> {
        let candidates = self.source.fetch_latest().await?;
        debug!(candidates = candidates.len(), "fetched candidates");

        // merge + persist is the critical section: readers wait for both.
        // The file I/O runs on the blocking pool with the write guard moved in.
        let mut store = self.store.clone().write_owned().await;
        let (merge, total) = tokio::task::spawn_blocking(move || {
            let merge = store.merge(candidates);
            // Also catches up after an earlier failed write.
            if store.is_dirty() {
                store.persist()?;
            }
            Ok::<_, StoreError>((merge, store.len()))
        })
        .await??;
        Ok((merge, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use collector_core::Record;
    use collector_storage::{CorruptPolicy, HistoryStore};
    use serde_json::json;
    use tokio::sync::Notify;

    fn rec(issue: &str) -> Record {
        Record::try_from(json!({"issueNumber": issue, "number": "1"})).unwrap()
    }

    /// Replays a fixed script of fetch results, then returns empty-body errors.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<Record>, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<Record>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl GameSource for ScriptedSource {
        async fn fetch_latest(&self) -> Result<Vec<Record>, FetchError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::MalformedBody("script exhausted".to_string())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Blocks inside `fetch_latest` until released.
    struct GatedSource {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl GameSource for GatedSource {
        async fn fetch_latest(&self) -> Result<Vec<Record>, FetchError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![rec("1")])
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn memory_store() -> SharedStore {
        Arc::new(RwLock::new(HistoryStore::in_memory(5000)))
    }

    #[tokio::test]
    async fn fetch_failure_does_not_poison_next_cycle() {
        let store = memory_store();
        let source = ScriptedSource::new(vec![
            Ok(vec![rec("99"), rec("100")]),
            Err(FetchError::HttpStatus(502)),
            Ok(vec![rec("100"), rec("101")]),
        ]);
        let collector = Collector::new(source, store.clone());

        assert_eq!(
            collector.run_cycle().await,
            CycleOutcome::Completed { added: 2, evicted: 0, total: 2 }
        );

        let failed = collector.run_cycle().await;
        assert!(matches!(failed, CycleOutcome::Failed { ref reason } if reason.contains("502")));
        let meta = collector.metadata().await;
        assert_eq!(meta.cycles_failed, 1);
        assert!(meta.last_error.is_some());
        assert!(meta.last_checked > meta.last_success);

        assert_eq!(
            collector.run_cycle().await,
            CycleOutcome::Completed { added: 1, evicted: 0, total: 3 }
        );
        let keys: Vec<String> = store
            .read()
            .await
            .records()
            .iter()
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(keys, vec!["101", "100", "99"]);

        let meta = collector.metadata().await;
        assert_eq!(meta.cycles_completed, 2);
        assert_eq!(meta.last_added, 1);
        assert!(meta.last_error.is_none());
        assert_eq!(meta.last_checked, meta.last_success);
    }

    #[tokio::test]
    async fn trigger_while_running_is_dropped() {
        let source = Arc::new(GatedSource {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let collector = Arc::new(Collector::new(source.clone(), memory_store()));

        let first = tokio::spawn({
            let collector = collector.clone();
            async move { collector.run_cycle().await }
        });
        source.entered.notified().await;
        assert!(collector.is_running());

        assert_eq!(collector.run_cycle().await, CycleOutcome::Skipped);
        assert_eq!(collector.metadata().await.triggers_dropped, 1);

        source.release.notify_one();
        assert!(matches!(first.await.unwrap(), CycleOutcome::Completed { added: 1, .. }));
        assert!(!collector.is_running());
    }

    #[tokio::test]
    async fn persists_only_when_records_added() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gameData.json");
        let store: SharedStore = Arc::new(RwLock::new(
            HistoryStore::open(&path, 100, CorruptPolicy::Fail).unwrap(),
        ));
        let source = ScriptedSource::new(vec![Ok(vec![rec("7")]), Ok(vec![rec("7")])]);
        let collector = Collector::new(source, store);

        collector.run_cycle().await;
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            collector.run_cycle().await,
            CycleOutcome::Completed { added: 0, evicted: 0, total: 1 }
        );
        assert!(!path.exists(), "nothing new, nothing written");
    }

    #[tokio::test]
    async fn persist_failure_is_cycle_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("disk");
        let path = dir.join("gameData.json");
        let store: SharedStore = Arc::new(RwLock::new(
            HistoryStore::open(&path, 100, CorruptPolicy::Fail).unwrap(),
        ));
        // Replace the data directory with a plain file so writes fail.
        std::fs::remove_dir(&dir).unwrap();
        std::fs::write(&dir, "not a directory").unwrap();

        let source = ScriptedSource::new(vec![Ok(vec![rec("1")]), Ok(vec![rec("2")])]);
        let collector = Collector::new(source, store.clone());

        let outcome = collector.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Failed { ref reason } if reason.starts_with("store failed")));
        assert!(collector.metadata().await.last_success.is_none());
        // The merge itself stands; the next successful write catches up.
        assert_eq!(store.read().await.len(), 1);

        std::fs::remove_file(&dir).unwrap();
        std::fs::create_dir(&dir).unwrap();
        assert!(matches!(collector.run_cycle().await, CycleOutcome::Completed { added: 1, total: 2, .. }));

        let reopened = HistoryStore::open(&path, 100, CorruptPolicy::Fail).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[tokio::test]
    async fn unchanged_batch_after_failed_persist_still_reaches_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("disk");
        let path = dir.join("gameData.json");
        let store: SharedStore = Arc::new(RwLock::new(
            HistoryStore::open(&path, 100, CorruptPolicy::Fail).unwrap(),
        ));
        std::fs::remove_dir(&dir).unwrap();
        std::fs::write(&dir, "not a directory").unwrap();

        let source = ScriptedSource::new(vec![
            Ok(vec![rec("1")]),
            Ok(vec![rec("1")]),
            Ok(vec![rec("1")]),
        ]);
        let collector = Collector::new(source, store.clone());

        assert!(matches!(collector.run_cycle().await, CycleOutcome::Failed { .. }));
        std::fs::remove_file(&dir).unwrap();
        std::fs::create_dir(&dir).unwrap();

        assert_eq!(
            collector.run_cycle().await,
            CycleOutcome::Completed { added: 0, evicted: 0, total: 1 }
        );
        assert!(!store.read().await.is_dirty());
        assert!(path.exists());

        let restarted = HistoryStore::open(&path, 100, CorruptPolicy::Fail).unwrap();
        assert_eq!(restarted.len(), 1);

        // Clean again: the next identical batch does not rewrite the file.
        std::fs::remove_file(&path).unwrap();
        collector.run_cycle().await;
        assert!(!path.exists());
    }
}
