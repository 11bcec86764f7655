//! Periodic background sweep of stale cache entries

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::InsightCache;

/// Spawn a task that sweeps `cache` every `period`.
///
/// The first sweep runs one full period after start. A failed sweep is
/// logged and retried on the next tick. Abort the returned handle to stop.
pub fn spawn_sweeper(cache: Arc<InsightCache>, period: Duration) -> JoinHandle<()> {
    info!("Starting cache sweeper: every {}s", period.as_secs());

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let cache = cache.clone();
            match tokio::task::spawn_blocking(move || cache.sweep()).await {
                Ok(Ok(report)) if report.purged > 0 || report.failed > 0 => {
                    info!(
                        "Cache sweep: scanned {}, purged {}, failed {}",
                        report.scanned, report.purged, report.failed
                    );
                }
                Ok(Ok(report)) => debug!(scanned = report.scanned, "Cache sweep found nothing stale"),
                Ok(Err(e)) => warn!("Cache sweep failed: {}", e),
                Err(e) => warn!("Cache sweep task panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InsightStore, MemoryStore};
    use crate::config::CacheConfig;
    use crate::telemetry::MemorySink;

    #[tokio::test]
    async fn test_sweeper_runs_periodically() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw("broken", "nope");
        let sink = Arc::new(MemorySink::new());
        let cache = Arc::new(InsightCache::new(store.clone(), &CacheConfig::default()).with_telemetry(sink.clone()));

        let handle = spawn_sweeper(cache, Duration::from_millis(20));
        for _ in 0..100 {
            if sink.count("cache_swept") > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(sink.count("cache_swept") >= 1);
        assert!(store.subjects().unwrap().is_empty());
    }
}
