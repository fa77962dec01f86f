//! # Tiercache Jobs
//!
//! Background work around the cache. The [`CacheWarmer`] periodically
//! pre-populates high-value keys supplied by a [`WarmingSource`] so the
//! first real request after a deploy or expiry finds them cached.

pub mod warmer;

pub use warmer::{CacheWarmer, WarmCandidate, WarmingReport, WarmingSource};
