//! In-process cache statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated on every orchestrator call.
#[derive(Debug, Default)]
pub struct CacheStats {
    hot_hits: AtomicU64,
    hot_misses: AtomicU64,
    distributed_hits: AtomicU64,
    distributed_misses: AtomicU64,
    computations: AtomicU64,
    compute_failures: AtomicU64,
    coalesced: AtomicU64,
    backend_errors: AtomicU64,
    corrupt_entries: AtomicU64,
}

macro_rules! incr {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    incr! {
        hot_hit => hot_hits,
        hot_miss => hot_misses,
        distributed_hit => distributed_hits,
        distributed_miss => distributed_misses,
        computation => computations,
        compute_failure => compute_failures,
        coalesced_wait => coalesced,
        backend_error => backend_errors,
        corrupt_entry => corrupt_entries,
    }

    /// Point-in-time copy, with hot tier occupancy supplied by the caller.
    pub fn snapshot(&self, hot_entries: usize, hot_evictions: u64, hot_expirations: u64) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            hot_misses: self.hot_misses.load(Ordering::Relaxed),
            distributed_hits: self.distributed_hits.load(Ordering::Relaxed),
            distributed_misses: self.distributed_misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            hot_entries,
            hot_evictions,
            hot_expirations,
        }
    }
}

/// Serializable view of [`CacheStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hot_hits: u64,
    pub hot_misses: u64,
    pub distributed_hits: u64,
    pub distributed_misses: u64,
    pub computations: u64,
    pub compute_failures: u64,
    /// Callers that received a value computed by another caller.
    pub coalesced_waits: u64,
    pub backend_errors: u64,
    pub corrupt_entries: u64,
    pub hot_entries: usize,
    pub hot_evictions: u64,
    pub hot_expirations: u64,
}

impl CacheStatsSnapshot {
    /// Lookups served from either tier.
    pub fn hits(&self) -> u64 {
        self.hot_hits + self.distributed_hits
    }

    /// Fraction of lookups served without computing.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.distributed_misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(CacheStats::new().snapshot(0, 0, 0).hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();
        stats.hot_hit();
        stats.hot_miss();
        stats.distributed_hit();
        stats.hot_miss();
        stats.distributed_miss();
        stats.distributed_miss();

        let snapshot = stats.snapshot(3, 1, 0);
        assert_eq!(snapshot.hits(), 2);
        assert!((snapshot.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.hot_entries, 3);
        assert_eq!(snapshot.hot_evictions, 1);
    }
}
