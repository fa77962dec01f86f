//! Cache metrics.
//!
//! Emitted through the `metrics` facade; the host application installs the
//! exporter.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use tiercache_core::Namespace;

/// Metric names for the cache engine.
pub mod names {
    /// Lookups by tier and result.
    pub const LOOKUPS_TOTAL: &str = "tiercache_lookups_total";
    /// `compute_fn` invocations by result.
    pub const COMPUTATIONS_TOTAL: &str = "tiercache_computations_total";
    /// Callers currently waiting on another caller's computation.
    pub const INFLIGHT_WAITERS: &str = "tiercache_inflight_waiters";
    /// Stored entries that failed to decode.
    pub const CORRUPT_ENTRIES_TOTAL: &str = "tiercache_corrupt_entries_total";
    /// Live entries evicted from the hot tier to make room.
    pub const HOT_EVICTIONS_TOTAL: &str = "tiercache_hot_evictions_total";
    /// Warm candidates by outcome.
    pub const WARM_CANDIDATES_TOTAL: &str = "tiercache_warm_candidates_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::LOOKUPS_TOTAL,
        "Total number of cache lookups by tier and result"
    );
    describe_counter!(
        names::COMPUTATIONS_TOTAL,
        "Total number of value computations on cache miss"
    );
    describe_gauge!(
        names::INFLIGHT_WAITERS,
        "Current number of callers waiting on an in-flight computation"
    );
    describe_counter!(
        names::CORRUPT_ENTRIES_TOTAL,
        "Total number of stored entries that failed to decode"
    );
    describe_counter!(
        names::HOT_EVICTIONS_TOTAL,
        "Total number of live hot tier entries evicted for capacity"
    );
    describe_counter!(
        names::WARM_CANDIDATES_TOTAL,
        "Total number of warm candidates by outcome"
    );

    tiercache_store::metrics::register_metrics();
}

#[derive(Debug, Clone, Copy)]
pub enum Tier {
    Hot,
    Distributed,
}

impl Tier {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Distributed => "distributed",
        }
    }
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a lookup.
    pub fn lookup(namespace: Namespace, tier: Tier, hit: bool) {
        counter!(
            names::LOOKUPS_TOTAL,
            "namespace" => namespace.as_str(),
            "tier" => tier.as_str(),
            "result" => if hit { "hit" } else { "miss" }
        )
        .increment(1);
    }

    /// Record a computation.
    pub fn computation(namespace: Namespace, success: bool) {
        counter!(
            names::COMPUTATIONS_TOTAL,
            "namespace" => namespace.as_str(),
            "result" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    /// A caller started waiting on an in-flight computation.
    pub fn waiter_added() {
        gauge!(names::INFLIGHT_WAITERS).increment(1.0);
    }

    /// A waiting caller resumed.
    pub fn waiter_removed() {
        gauge!(names::INFLIGHT_WAITERS).decrement(1.0);
    }

    /// Record a corrupt entry.
    pub fn corrupt_entry(namespace: Namespace) {
        counter!(names::CORRUPT_ENTRIES_TOTAL, "namespace" => namespace.as_str()).increment(1);
    }

    /// Record a hot tier eviction.
    pub fn hot_eviction() {
        counter!(names::HOT_EVICTIONS_TOTAL).increment(1);
    }

    /// Record a warm candidate outcome (`warmed`, `failed`, `skipped`).
    pub fn warm_candidate(result: &'static str) {
        counter!(names::WARM_CANDIDATES_TOTAL, "result" => result).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // Just verify registration doesn't panic
        register_metrics();
    }

    #[test]
    fn test_cache_metrics() {
        CacheMetrics::lookup(Namespace::Lead, Tier::Hot, true);
        CacheMetrics::lookup(Namespace::Lead, Tier::Distributed, false);
        CacheMetrics::computation(Namespace::Lead, true);
        CacheMetrics::waiter_added();
        CacheMetrics::waiter_removed();
        CacheMetrics::corrupt_entry(Namespace::Ai);
        CacheMetrics::hot_eviction();
        CacheMetrics::warm_candidate("warmed");
    }
}
