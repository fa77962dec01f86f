//! The distributed tier contract.

use async_trait::async_trait;
use tiercache_core::{CacheError, CacheKey, CachePattern, CacheResult};

pub type StoreResult<T> = CacheResult<T>;

/// A shared key-value store with per-key TTL and glob deletion.
///
/// Implementations map transport failures, timeouts, and pool exhaustion to
/// [`CacheError::BackendUnavailable`].
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Returns the stored envelope, or `None` when the key is absent or expired.
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `value` with an expiry. `ttl_secs <= 0` fails with
    /// `InvalidTtl` before the backend is contacted.
    async fn set_with_ttl(&self, key: &CacheKey, value: Vec<u8>, ttl_secs: i64) -> StoreResult<()>;

    /// Removes one key, returning whether it existed.
    async fn delete(&self, key: &CacheKey) -> StoreResult<bool>;

    /// Removes every key matching `pattern`, returning the count removed.
    async fn delete_by_pattern(&self, pattern: &CachePattern) -> StoreResult<u64>;

    /// Checks backend reachability.
    async fn ping(&self) -> StoreResult<bool>;
}

/// Checks a TTL and converts it to whole seconds.
pub fn validate_ttl(ttl_secs: i64) -> StoreResult<u64> {
    u64::try_from(ttl_secs)
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or(CacheError::InvalidTtl(ttl_secs))
}
