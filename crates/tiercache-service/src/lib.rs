//! # Tiercache Service
//!
//! The orchestrator that every cache read and write goes through. It owns
//! the in-process hot tier, talks to the distributed tier through
//! [`tiercache_store::DistributedStore`], and coalesces concurrent misses
//! for one key into a single computation.

pub mod hot_cache;
pub mod metrics;
pub mod orchestrator;
pub mod stats;

pub use hot_cache::HotCache;
pub use orchestrator::{CacheHealth, CacheOrchestrator};
pub use stats::{CacheStats, CacheStatsSnapshot};
