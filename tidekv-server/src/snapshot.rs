//! # Snapshot Scheduler
//!
//! Purpose: Periodically write the cache's live entries to a durable
//! file, cancellable at shutdown.
//!
//! ## Design Principles
//! 1. **Fire-And-Forget Interval**: a plain `tokio::time::interval` loop,
//!    mirroring the janitor's shape but on the async side since the
//!    server crate owns the runtime.
//! 2. **Shutdown Waits, Doesn't Abort**: a snapshot in progress is not
//!    interrupted; the stop signal is only checked between ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use tidekv_engine::Cache;

/// Handle to a running snapshot scheduler.
pub struct SnapshotScheduler {
    stop: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SnapshotScheduler {
    /// Spawns a task that calls `cache.snapshot(path)` every `interval`
    /// until [`stop`](SnapshotScheduler::stop) is called.
    pub fn spawn(cache: Arc<Cache>, path: String, interval: Duration) -> Self {
        let stop = Arc::new(Notify::new());
        let stop_task = Arc::clone(&stop);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a snapshot is
            // not written the instant the process starts.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = cache.snapshot(&path) {
                            tracing::error!(%err, path = %path, "snapshot write failed");
                        }
                    }
                    _ = stop_task.notified() => break,
                }
            }
        });

        SnapshotScheduler { stop, join }
    }

    /// Signals the scheduler to stop and waits for any in-flight
    /// snapshot write to finish.
    pub async fn stop(self) {
        self.stop.notify_one();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_a_snapshot_on_each_tick() {
        let cache = Arc::new(Cache::new(1, 10));
        cache.set(std::sync::Arc::from(&b"k"[..]), std::sync::Arc::from(&b"v"[..]), None);

        let path = std::env::temp_dir().join(format!(
            "tidekv-snapshot-scheduler-test-{:?}",
            std::thread::current().id()
        ));
        let path_str = path.to_string_lossy().into_owned();

        let scheduler = SnapshotScheduler::spawn(cache, path_str, Duration::from_millis(15));
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop().await;

        let data = std::fs::read(&path).unwrap();
        assert!(!data.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
