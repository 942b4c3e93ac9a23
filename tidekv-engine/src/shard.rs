//! # LRU Shard
//!
//! Provide one independent, approximately-LRU key/value map with per-entry
//! TTL and sampled eviction, sized to keep shards small and lock
//! contention local.
//!
//! ## Design Principles
//!
//! 1. **Sampled Over Exact LRU**: A doubly-linked recency list turns every
//!    read into an exclusive write; sampling lets `Get` share a shard lock
//!    with other reads in spirit while still being correct under a single
//!    `RwLock` per shard.
//! 2. **Parallel Key Vector**: `keys`/`entries` are parallel dense vectors;
//!    `map` holds each key's current index. Deletion is `Vec::swap_remove`,
//!    which is exactly the swap-with-last scheme this data structure wants:
//!    O(1), no tombstones, no linked-list pointers.
//! 3. **Modular Clock**: `clock` is a plain `u64` counter that wraps; recency
//!    comparisons use `wrapping_sub` so a freshly-wrapped tick still reads as
//!    "newest" against an unwrapped one.
//!
//! ## Structure Overview
//!
//! ```text
//! Shard
//!   └── inner: RwLock<ShardInner>
//!         ├── map: HashMap<Arc<[u8]>, usize>   // key -> index
//!         ├── keys: Vec<Arc<[u8]>>             // parallel to entries
//!         ├── entries: Vec<Slot>               // value, expiry, access_tick
//!         ├── clock: u64
//!         └── rng: SmallRng
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Number of keys sampled (with replacement) per eviction round.
pub const SAMPLE_SIZE: usize = 32;

/// Default janitor sweep interval.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(5);

/// One live entry: its value, optional expiry, and LRU recency stamp.
#[derive(Debug, Clone)]
struct Slot {
    value: Arc<[u8]>,
    expiry: Option<Instant>,
    access_tick: u64,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expiry, Some(deadline) if now >= deadline)
    }
}

/// Shard state guarded by a single `RwLock`. Every public `Shard` operation
/// acquires it; `map`, `keys`, and `entries` are kept in lockstep so that
/// `keys[map[k]] == k` holds after every mutation (the map's value plays
/// the role of a per-entry index field — one source of truth instead of a
/// duplicated one).
struct ShardInner {
    map: HashMap<Arc<[u8]>, usize, RandomState>,
    keys: Vec<Arc<[u8]>>,
    entries: Vec<Slot>,
    capacity: usize,
    clock: u64,
    rng: SmallRng,
}

impl ShardInner {
    fn tick(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    /// Removes the entry at `idx` via swap-with-last, keeping `map` in sync
    /// with the element that now occupies `idx`.
    fn remove_at(&mut self, idx: usize) {
        let removed_key = self.keys.swap_remove(idx);
        self.entries.swap_remove(idx);
        self.map.remove(removed_key.as_ref());
        if idx < self.keys.len() {
            self.map.insert(self.keys[idx].clone(), idx);
        }
    }

    /// One round of approximate-LRU eviction: sample up to `SAMPLE_SIZE`
    /// keys with replacement, drop any that are expired on sight, and
    /// evict the least-recently-used survivor if still over capacity.
    fn sampled_eviction(&mut self, now: Instant) {
        let mut oldest: Option<(Arc<[u8]>, u64)> = None;

        for _ in 0..SAMPLE_SIZE {
            if self.keys.is_empty() {
                break;
            }
            let idx = self.rng.gen_range(0..self.keys.len());
            if self.entries[idx].is_expired(now) {
                self.remove_at(idx);
                continue;
            }
            let key = self.keys[idx].clone();
            let dist = self.clock.wrapping_sub(self.entries[idx].access_tick);
            let replace = match &oldest {
                Some((_, best)) => dist > *best,
                None => true,
            };
            if replace {
                oldest = Some((key, dist));
            }
        }

        if self.keys.len() <= self.capacity {
            return;
        }

        if let Some((key, _)) = oldest {
            if let Some(&idx) = self.map.get(key.as_ref()) {
                self.remove_at(idx);
                return;
            }
        }

        // No candidate survived the sample (all drawn entries were expired,
        // or the shard was empty of live candidates) yet we are still over
        // capacity: exactly one entry must still go in this case.
        if !self.keys.is_empty() {
            self.remove_at(self.keys.len() - 1);
        }
    }
}

/// One independently-locked shard of the sharded cache.
pub struct Shard {
    inner: RwLock<ShardInner>,
}

impl Shard {
    pub fn new(capacity: usize) -> Self {
        Shard {
            inner: RwLock::new(ShardInner {
                map: HashMap::with_hasher(RandomState::new()),
                keys: Vec::new(),
                entries: Vec::new(),
                capacity,
                clock: 0,
                rng: SmallRng::from_entropy(),
            }),
        }
    }

    /// Looks up `key`, touching its recency on a live hit.
    pub fn get(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let idx = *inner.map.get(key)?;
        if inner.entries[idx].is_expired(now) {
            inner.remove_at(idx);
            return None;
        }

        let tick = inner.tick();
        inner.entries[idx].access_tick = tick;
        Some(inner.entries[idx].value.clone())
    }

    /// Inserts or overwrites `key`. `ttl_ms < 0` means "never expires".
    /// May trigger one round of sampled eviction if this insert grows the
    /// shard past capacity.
    pub fn set(&self, key: Arc<[u8]>, value: Arc<[u8]>, ttl_ms: Option<i64>) {
        let now = Instant::now();
        let expiry = match ttl_ms {
            Some(ms) if ms >= 0 => Some(now + Duration::from_millis(ms as u64)),
            _ => None,
        };

        let mut inner = self.inner.write();
        let tick = inner.tick();

        if let Some(&idx) = inner.map.get(key.as_ref()) {
            inner.entries[idx] = Slot {
                value,
                expiry,
                access_tick: tick,
            };
            return;
        }

        let idx = inner.keys.len();
        inner.keys.push(key.clone());
        inner.entries.push(Slot {
            value,
            expiry,
            access_tick: tick,
        });
        inner.map.insert(key, idx);

        if inner.keys.len() > inner.capacity {
            inner.sampled_eviction(now);
        }
    }

    /// Removes `key` if present; a no-op otherwise.
    pub fn delete(&self, key: &[u8]) {
        let mut inner = self.inner.write();
        if let Some(&idx) = inner.map.get(key) {
            inner.remove_at(idx);
        }
    }

    /// Runs sampled eviction rounds until the shard is back at or under
    /// capacity. Intended for the periodic janitor sweep.
    pub fn run_janitor_round(&self) {
        let now = Instant::now();
        let mut inner = self.inner.write();
        while inner.keys.len() > inner.capacity {
            inner.sampled_eviction(now);
        }
    }

    /// Returns every live `(key, value)` pair for snapshotting. Taken under
    /// this shard's own lock only; callers must not hold it across other
    /// shards' locks (snapshotting is per-shard consistent, not global).
    pub fn live_entries(&self) -> Vec<(Arc<[u8]>, Arc<[u8]>)> {
        let now = Instant::now();
        let inner = self.inner.read();
        inner
            .keys
            .iter()
            .zip(inner.entries.iter())
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Returns the number of live-or-not entries currently held (used by
    /// tests to assert the capacity bound).
    pub fn len(&self) -> usize {
        self.inner.read().keys.len()
    }
}
