//! # Sharded Cache
//!
//! Fan a key out to one of a fixed number of independent [`Shard`]s, run a
//! background janitor per shard, and provide an atomic-per-shard snapshot
//! to a durable file.
//!
//! ## Design Principles
//!
//! 1. **Cheap, Stable Routing**: The routing hash only needs to be stable
//!    across a process lifetime, not cryptographically strong — it is not
//!    part of the external contract.
//! 2. **No Global Lock**: Snapshot and cleanup touch shards one at a time;
//!    two different shards never block each other.
//! 3. **Background Threads, Not Async**: The janitor is a `std::thread`
//!    per shard, so this crate stays runtime-agnostic; the server crate
//!    supplies the async I/O.

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tidekv_common::codec::encode_bulk_array;

use crate::shard::{Shard, DEFAULT_JANITOR_INTERVAL};

/// Routes `key` to a shard index using the accumulator hash:
/// `Σ ((13·i) mod 97 + 5·byte_i) mod shard_count`. The exact function is
/// not part of the external contract, only its stability across the
/// process lifetime.
fn route_hash(key: &[u8], shard_count: usize) -> usize {
    let mut sum: i64 = 0;
    for (i, &byte) in key.iter().enumerate() {
        sum += (13 * i as i64) % 97 + 5 * byte as i64;
    }
    (sum.rem_euclid(shard_count as i64)) as usize
}

struct Janitor {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Janitor {
    fn spawn(shard: Arc<Shard>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let join = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                if stop_thread.load(Ordering::Acquire) {
                    break;
                }
                shard.run_janitor_round();
            }
        });
        Janitor {
            stop,
            join: Some(join),
        }
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Key → shard fan-out, snapshot orchestration, and background janitors.
pub struct Cache {
    shards: Vec<Arc<Shard>>,
    janitors: Vec<Janitor>,
}

impl Cache {
    /// Builds a cache with `shard_count` shards, each capped at
    /// `capacity_per_shard` entries, with janitors on the default interval.
    pub fn new(shard_count: usize, capacity_per_shard: usize) -> Self {
        Self::with_janitor_interval(shard_count, capacity_per_shard, DEFAULT_JANITOR_INTERVAL)
    }

    /// Like [`Cache::new`] but with an explicit janitor sweep interval
    /// (tests use a short interval to observe eviction without waiting).
    pub fn with_janitor_interval(
        shard_count: usize,
        capacity_per_shard: usize,
        janitor_interval: Duration,
    ) -> Self {
        let shard_count = shard_count.max(1);
        let shards: Vec<Arc<Shard>> = (0..shard_count)
            .map(|_| Arc::new(Shard::new(capacity_per_shard)))
            .collect();
        let janitors = shards
            .iter()
            .map(|shard| Janitor::spawn(Arc::clone(shard), janitor_interval))
            .collect();

        Cache { shards, janitors }
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[route_hash(key, self.shards.len())]
    }

    pub fn get(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        self.shard_for(key).get(key)
    }

    pub fn set(&self, key: Arc<[u8]>, value: Arc<[u8]>, ttl_ms: Option<i64>) {
        self.shard_for(key.as_ref()).set(key, value, ttl_ms)
    }

    pub fn delete(&self, key: &[u8]) {
        self.shard_for(key).delete(key)
    }

    /// Writes every live entry, one shard at a time under that shard's own
    /// lock, as concatenated `[key, value]` bulk-string-array frames to a
    /// newly-created (truncated) file at `path`. The result is per-shard
    /// consistent but not a single atomic global snapshot.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        for shard in &self.shards {
            for (key, value) in shard.live_entries() {
                let frame = encode_bulk_array(&[key.as_ref(), value.as_ref()]);
                file.write_all(&frame)?;
            }
        }
        Ok(())
    }

    /// Signals every shard's janitor to stop and waits for it to exit.
    pub fn cleanup(&mut self) {
        for janitor in &mut self.janitors {
            janitor.stop();
        }
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn routing_is_stable_across_calls() {
        let cache = Cache::new(8, 100);
        let shard_a = route_hash(b"alpha", 8);
        let shard_b = route_hash(b"alpha", 8);
        assert_eq!(shard_a, shard_b);
        assert!(cache.get(b"alpha").is_none());
    }

    #[test]
    fn set_get_delete_round_trip() {
        let cache = Cache::new(4, 100);
        cache.set(StdArc::from(&b"k"[..]), StdArc::from(&b"v"[..]), None);
        assert_eq!(cache.get(b"k").as_deref(), Some(&b"v"[..]));
        cache.delete(b"k");
        assert!(cache.get(b"k").is_none());
    }

    #[test]
    fn snapshot_writes_live_entries() {
        let cache = Cache::new(2, 100);
        cache.set(StdArc::from(&b"a"[..]), StdArc::from(&b"1"[..]), None);
        cache.set(StdArc::from(&b"b"[..]), StdArc::from(&b"2"[..]), None);

        let dir = std::env::temp_dir().join(format!("tidekv-snapshot-test-{:?}", std::thread::current().id()));
        cache.snapshot(&dir).unwrap();
        let data = std::fs::read(&dir).unwrap();
        assert!(!data.is_empty());
        // both keys should appear somewhere in the concatenated frames.
        assert!(twoway_contains(&data, b"a"));
        assert!(twoway_contains(&data, b"b"));
        let _ = std::fs::remove_file(&dir);
    }

    fn twoway_contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle)
    }

    #[test]
    fn janitor_enforces_capacity_bound_eventually() {
        let cache = Cache::with_janitor_interval(1, 2, Duration::from_millis(10));
        for i in 0..10 {
            cache.set(
                StdArc::from(format!("k{i}").into_bytes().into_boxed_slice()),
                StdArc::from(&b"v"[..]),
                None,
            );
        }
        thread::sleep(Duration::from_millis(100));
        assert!(cache.shards[0].len() <= 2);
    }
}
