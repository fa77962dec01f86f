//! In-process hot tier.
//!
//! A bounded map with exact LRU eviction and lazy per-entry expiry. Values
//! are serialized JSON shared behind `Arc` so one slot serves every reader.

use crate::metrics::CacheMetrics;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tiercache_config::HotCacheConfig;
use tiercache_core::{CacheKey, CachePattern};
use tokio::time::Instant;

struct Slot {
    value: Arc<[u8]>,
    expires_at: Instant,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<CacheKey, Slot>,
    /// Access tick -> key, oldest first.
    recency: BTreeMap<u64, CacheKey>,
    /// (expiry, tick) -> key, soonest first.
    expiry: BTreeMap<(Instant, u64), CacheKey>,
    next_tick: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        self.expiry.remove(&(slot.expires_at, slot.tick));
        Some(slot)
    }

    fn touch(&mut self, key: &CacheKey) -> Option<Arc<[u8]>> {
        let tick = self.tick();
        let slot = self.slots.get_mut(key)?;
        let old_tick = std::mem::replace(&mut slot.tick, tick);
        let expires_at = slot.expires_at;
        let value = Arc::clone(&slot.value);

        self.recency.remove(&old_tick);
        self.recency.insert(tick, key.clone());
        self.expiry.remove(&(expires_at, old_tick));
        self.expiry.insert((expires_at, tick), key.clone());
        Some(value)
    }

    /// Removes one entry to make room, expired entries first.
    /// Returns true when a live entry was evicted.
    fn evict_one(&mut self, now: Instant) -> Option<bool> {
        let expired = self
            .expiry
            .first_key_value()
            .filter(|((expires_at, _), _)| *expires_at <= now)
            .map(|(_, key)| key.clone());
        if let Some(key) = expired {
            self.remove(&key);
            return Some(false);
        }

        let lru = self.recency.first_key_value().map(|(_, key)| key.clone())?;
        self.remove(&lru);
        Some(true)
    }
}

/// Bounded in-process cache with exact LRU eviction.
pub struct HotCache {
    inner: Mutex<Inner>,
    capacity: usize,
    max_ttl: Duration,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl HotCache {
    /// Creates a hot cache. A capacity of zero disables it.
    #[must_use]
    pub fn new(capacity: usize, max_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
            max_ttl,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn from_config(config: &HotCacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upper bound on any entry's lifetime.
    #[must_use]
    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Returns the value and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.lock();
        let expires_at = inner.slots.get(key)?.expires_at;
        if expires_at <= Instant::now() {
            inner.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        inner.touch(key)
    }

    /// Inserts or replaces a value. `ttl` is capped at the cache-wide maximum.
    pub fn put(&self, key: CacheKey, value: Arc<[u8]>, ttl: Duration) {
        let ttl = ttl.min(self.max_ttl);
        if !self.is_enabled() || ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.remove(&key);

        while inner.slots.len() >= self.capacity {
            match inner.evict_one(now) {
                Some(true) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    CacheMetrics::hot_eviction();
                }
                Some(false) => {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        let tick = inner.tick();
        let expires_at = now + ttl;
        inner.recency.insert(tick, key.clone());
        inner.expiry.insert((expires_at, tick), key.clone());
        inner.slots.insert(key, Slot { value, expires_at, tick });
    }

    /// Removes one key, returning whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Removes every key matching `pattern`, returning the count.
    pub fn invalidate_pattern(&self, pattern: &CachePattern) -> usize {
        let mut inner = self.inner.lock();
        let matching: Vec<CacheKey> = inner.slots.keys().filter(|k| pattern.matches(k)).cloned().collect();
        for key in &matching {
            inner.remove(key);
        }
        matching.len()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.recency.clear();
        inner.expiry.clear();
    }

    /// Live entries evicted for capacity.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries dropped after their TTL.
    #[must_use]
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}
