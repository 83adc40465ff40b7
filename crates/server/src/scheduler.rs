//! Fixed-interval driver for collection cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::collector::Collector;

/// Run collection cycles every `period` until `shutdown` fires.
///
/// The first tick fires immediately, which is the startup kick. Ticks that
/// come due while a cycle is still running are skipped rather than queued,
/// and there is no backoff: a failed cycle is simply retried on the next tick.
pub async fn run_scheduler(
    collector: Arc<Collector>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = period.as_millis() as u64, "collection scheduler started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                collector.run_cycle().await;
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }

    info!("collection scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use collector_connector::{FetchError, GameSource};
    use collector_core::Record;
    use collector_storage::HistoryStore;
    use serde_json::json;
    use tokio::sync::RwLock;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GameSource for CountingSource {
        async fn fetch_latest(&self) -> Result<Vec<Record>, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                return Err(FetchError::HttpStatus(500));
            }
            Ok(vec![Record::try_from(json!({ "issueNumber": n })).unwrap()])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown_and_survives_failures() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(RwLock::new(HistoryStore::in_memory(100)));
        let collector = Arc::new(Collector::new(source.clone(), store.clone()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_scheduler(
            collector.clone(),
            Duration::from_millis(20),
            rx,
        ));

        // Startup kick happens without waiting a full period.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Paused clock: ticks at 20, 40, ..., 100 ms.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler should stop on shutdown")
            .unwrap();

        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls >= 4, "expected several ticks, got {calls}");

        let meta = collector.metadata().await;
        assert!(meta.cycles_failed >= 1);
        assert!(meta.cycles_completed >= 2);
        assert_eq!(store.read().await.len() as u64, meta.cycles_completed);
    }
}
