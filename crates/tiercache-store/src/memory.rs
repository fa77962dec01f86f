//! In-process store used when Redis is disabled and in tests.

use crate::metrics::StoreMetrics;
use crate::store::{validate_ttl, DistributedStore, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tiercache_core::{CacheError, CacheKey, CachePattern};
use tokio::time::Instant;
use tracing::debug;

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// A [`DistributedStore`] over a map with per-entry expiry.
///
/// Expired entries are dropped on access.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with `BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|v| v.expires_at > now).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time left before `key` expires.
    #[must_use]
    pub fn ttl_remaining(&self, key: &CacheKey) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key.as_str())
            .filter(|v| v.expires_at > now)
            .map(|v| v.expires_at - now)
    }

    /// Stores raw bytes without TTL validation.
    pub fn insert_raw(&self, key: &CacheKey, bytes: Vec<u8>, ttl: Duration) {
        self.entries.lock().insert(
            key.as_str().to_string(),
            StoredValue {
                bytes,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn check_available(&self, operation: &'static str) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            StoreMetrics::backend_error(operation);
            return Err(CacheError::backend_unavailable(format!("{operation}: memory store unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Vec<u8>>> {
        self.check_available("get")?;
        let mut entries = self.entries.lock();
        match entries.get(key.as_str()) {
            Some(v) if v.expires_at > Instant::now() => Ok(Some(v.bytes.clone())),
            Some(_) => {
                entries.remove(key.as_str());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &CacheKey, value: Vec<u8>, ttl_secs: i64) -> StoreResult<()> {
        let ttl = validate_ttl(ttl_secs)?;
        self.check_available("set")?;
        self.insert_raw(key, value, Duration::from_secs(ttl));
        debug!(key = %key, ttl_secs = ttl, "Stored entry in memory store");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> StoreResult<bool> {
        self.check_available("delete")?;
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key.as_str())
            .is_some_and(|v| v.expires_at > now))
    }

    async fn delete_by_pattern(&self, pattern: &CachePattern) -> StoreResult<u64> {
        self.check_available("delete_pattern")?;
        let now = Instant::now();
        let mut removed = 0;
        self.entries.lock().retain(|key, value| {
            if !pattern.matches_str(key) {
                return true;
            }
            if value.expires_at > now {
                removed += 1;
            }
            false
        });
        debug!(pattern = %pattern, removed, "Deleted entries by pattern");
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<bool> {
        self.check_available("ping")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercache_core::Namespace;

    fn key(entity: &str, attribute: Option<&str>) -> CacheKey {
        CacheKey::new(Namespace::Lead, entity, attribute).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        let k = key("lead-1", None);

        store.set_with_ttl(&k, b"v".to_vec(), 60).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), Some(b"v".to_vec()));
        assert!(store.delete(&k).await.unwrap());
        assert!(!store.delete(&k).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_ttl() {
        let store = MemoryStore::new();
        let k = key("lead-1", None);

        assert!(matches!(store.set_with_ttl(&k, vec![1], 0).await, Err(CacheError::InvalidTtl(0))));
        assert!(matches!(store.set_with_ttl(&k, vec![1], -1).await, Err(CacheError::InvalidTtl(-1))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ttl_checked_before_availability() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result = store.set_with_ttl(&key("lead-1", None), vec![1], 0).await;
        assert!(matches!(result, Err(CacheError::InvalidTtl(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        let k = key("lead-1", None);
        store.set_with_ttl(&k, vec![1], 5).await.unwrap();
        assert_eq!(store.ttl_remaining(&k), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get(&k).await.unwrap(), None);
        assert_eq!(store.ttl_remaining(&k), None);
    }

    #[tokio::test]
    async fn test_delete_by_pattern() {
        let store = MemoryStore::new();
        for k in [key("lead-1", None), key("lead-1", Some("score")), key("lead-2", None)] {
            store.set_with_ttl(&k, vec![1], 60).await.unwrap();
        }

        let removed = store.delete_by_pattern(&CachePattern::entity(Namespace::Lead, "lead-1").unwrap()).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);

        let removed = store.delete_by_pattern(&CachePattern::namespace_wide(Namespace::Lead)).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let k = key("lead-1", None);

        assert!(matches!(store.get(&k).await, Err(CacheError::BackendUnavailable(_))));
        assert!(matches!(store.ping().await, Err(CacheError::BackendUnavailable(_))));

        store.set_unavailable(false);
        assert!(store.ping().await.unwrap());
    }
}
