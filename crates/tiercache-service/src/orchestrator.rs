//! Cache orchestrator.
//!
//! Lookup order is hot tier, then distributed tier, then a single
//! computation per key shared by every concurrent caller. Storage
//! degradation (unavailable backend, corrupt entries) reads as a miss.

use crate::hot_cache::HotCache;
use crate::metrics::{CacheMetrics, Tier};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::future::Future;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tiercache_config::{CacheConfig, ConfigLoader, NamespacePolicy, PolicyTable};
use tiercache_core::{CacheError, CacheKey, CachePattern, CacheResult, Namespace};
use tiercache_store::{Codec, DistributedStore, MemoryStore, RedisStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum FlightState {
    Running,
    Ready(Arc<[u8]>),
    Abandoned,
}

type InFlightMap = HashMap<CacheKey, Arc<watch::Sender<FlightState>>>;

enum Role {
    Leader(FlightGuard),
    Waiter(watch::Receiver<FlightState>),
}

/// Held by the caller computing a key. Dropping it, on any path, releases
/// the marker; waiters that never saw a value retry their lookup.
struct FlightGuard {
    inflight: Arc<Mutex<InFlightMap>>,
    key: CacheKey,
    tx: Arc<watch::Sender<FlightState>>,
}

impl FlightGuard {
    fn publish(&self, payload: Arc<[u8]>) {
        self.tx.send_replace(FlightState::Ready(payload));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        {
            let mut inflight = self.inflight.lock();
            if inflight.get(&self.key).is_some_and(|tx| Arc::ptr_eq(tx, &self.tx)) {
                inflight.remove(&self.key);
            }
        }
        self.tx.send_if_modified(|state| {
            if matches!(state, FlightState::Running) {
                *state = FlightState::Abandoned;
                true
            } else {
                false
            }
        });
    }
}

const COMPLETION_SHARDS: usize = 64;

/// Completed-flight counters, sharded by key hash.
///
/// A caller that misses and then becomes leader checks the tiers again only
/// if its shard moved since the miss, i.e. a flight may have written the key
/// while the caller was reading.
struct Completions {
    shards: Box<[AtomicU64]>,
    hasher: RandomState,
}

impl Completions {
    fn new() -> Self {
        Self {
            shards: (0..COMPLETION_SHARDS).map(|_| AtomicU64::new(0)).collect(),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &CacheKey) -> &AtomicU64 {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        self.shard(key).load(Ordering::SeqCst)
    }

    fn record(&self, key: &CacheKey) {
        self.shard(key).fetch_add(1, Ordering::SeqCst);
    }
}

struct WaiterGauge;

impl WaiterGauge {
    fn enter() -> Self {
        CacheMetrics::waiter_added();
        Self
    }
}

impl Drop for WaiterGauge {
    fn drop(&mut self) {
        CacheMetrics::waiter_removed();
    }
}

/// Cache health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheHealth {
    /// Whether the distributed tier answered a ping.
    pub distributed: bool,
    pub hot_enabled: bool,
    pub hot_entries: usize,
    /// Keys currently being computed.
    pub inflight: usize,
}

/// Entry point for all cache reads and writes.
///
/// Build one at startup and share it behind an `Arc`.
pub struct CacheOrchestrator {
    store: Arc<dyn DistributedStore>,
    hot: HotCache,
    codec: Codec,
    policies: PolicyTable,
    inflight: Arc<Mutex<InFlightMap>>,
    completions: Completions,
    stats: CacheStats,
}

impl CacheOrchestrator {
    #[must_use]
    pub fn new(store: Arc<dyn DistributedStore>, hot: HotCache, codec: Codec, policies: PolicyTable) -> Self {
        Self {
            store,
            hot,
            codec,
            policies,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            completions: Completions::new(),
            stats: CacheStats::new(),
        }
    }

    /// Builds the hot tier and codec from configuration over `store`.
    #[must_use]
    pub fn from_config(store: Arc<dyn DistributedStore>, config: &CacheConfig, policies: PolicyTable) -> Self {
        Self::new(
            store,
            HotCache::from_config(&config.hot_cache),
            Codec::new(&config.compression),
            policies,
        )
    }

    /// Builds the orchestrator and its distributed tier from loaded
    /// configuration. With Redis disabled, an in-memory store stands in.
    pub async fn connect(loader: &ConfigLoader) -> CacheResult<Self> {
        let config = loader.config();
        let store: Arc<dyn DistributedStore> = if config.redis.enabled {
            Arc::new(RedisStore::connect(config).await?)
        } else {
            info!("Redis disabled, using in-memory distributed tier");
            Arc::new(MemoryStore::new())
        };
        Ok(Self::from_config(store, config, loader.policies().clone()))
    }

    fn policy(&self, namespace: Namespace) -> CacheResult<&NamespacePolicy> {
        let policy = self.policies.get(namespace);
        if policy.cacheable {
            Ok(policy)
        } else {
            Err(CacheError::NamespaceNotCacheable(namespace.to_string()))
        }
    }

    fn uses_hot_tier(&self, policy: &NamespacePolicy) -> bool {
        policy.hot_cache_eligible && self.hot.is_enabled()
    }

    /// Returns the cached value for the key, computing and storing it on a miss.
    ///
    /// Concurrent callers for the same key share one `compute` invocation.
    /// Key and namespace errors convert into `E`; a `compute` error is
    /// returned unchanged and nothing is cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: Namespace,
        entity_id: &str,
        attribute: Option<&str>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = self.policy(namespace)?;
        let key = CacheKey::new(namespace, entity_id, attribute)?;

        let guard = loop {
            let generation = self.completions.generation(&key);
            if let Some(value) = self.lookup(&key, policy).await {
                return Ok(value);
            }

            match self.join(&key) {
                Role::Leader(guard) => {
                    if self.completions.generation(&key) != generation {
                        debug!(key = %key, "Flight completed during lookup, checking tiers again");
                        if let Some(value) = self.lookup(&key, policy).await {
                            return Ok(value);
                        }
                    }
                    break guard;
                }
                Role::Waiter(rx) => {
                    if let Some(payload) = Self::wait(rx).await {
                        self.stats.coalesced_wait();
                        return serde_json::from_slice(&payload).map_err(|e| E::from(CacheError::from(e)));
                    }
                    debug!(key = %key, "In-flight computation abandoned, retrying lookup");
                }
            }
        };

        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                self.stats.compute_failure();
                CacheMetrics::computation(namespace, false);
                return Err(e);
            }
        };
        self.stats.computation();
        CacheMetrics::computation(namespace, true);

        let payload: Arc<[u8]> = serde_json::to_vec(&value).map_err(CacheError::from)?.into();
        self.write_tiers(&key, policy, &payload).await;
        self.completions.record(&key);
        guard.publish(payload);
        Ok(value)
    }

    /// Stores a value in both tiers, replacing any cached one.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        entity_id: &str,
        attribute: Option<&str>,
        value: &T,
    ) -> CacheResult<()> {
        let policy = self.policy(namespace)?;
        let key = CacheKey::new(namespace, entity_id, attribute)?;
        let payload: Arc<[u8]> = serde_json::to_vec(value)?.into();
        self.write_tiers(&key, policy, &payload).await;
        Ok(())
    }

    /// Removes one key from both tiers.
    pub async fn invalidate(&self, namespace: Namespace, entity_id: &str, attribute: Option<&str>) -> CacheResult<bool> {
        self.policy(namespace)?;
        let key = CacheKey::new(namespace, entity_id, attribute)?;

        let hot_removed = self.hot.invalidate(&key);
        let distributed_removed = match self.store.delete(&key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.absorb("delete", &key, &e);
                false
            }
        };
        debug!(key = %key, hot_removed, distributed_removed, "Invalidated key");
        Ok(hot_removed || distributed_removed)
    }

    /// Removes an entity key and every attribute key under it.
    ///
    /// Returns the number of keys removed from the distributed tier.
    pub async fn invalidate_namespace(&self, namespace: Namespace, entity_id: &str) -> CacheResult<u64> {
        self.policy(namespace)?;
        let key = CacheKey::new(namespace, entity_id, None)?;
        let pattern = CachePattern::entity(namespace, entity_id)?;

        self.hot.invalidate(&key);
        self.hot.invalidate_pattern(&pattern);

        let mut removed = 0;
        match self.store.delete(&key).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => self.absorb("delete", &key, &e),
        }
        match self.store.delete_by_pattern(&pattern).await {
            Ok(count) => removed += count,
            Err(e) => self.absorb("delete_pattern", &pattern, &e),
        }
        debug!(key = %key, removed, "Invalidated entity");
        Ok(removed)
    }

    /// Removes every key matching `pattern` from both tiers.
    ///
    /// Returns the number of keys removed from the distributed tier.
    pub async fn invalidate_pattern(&self, pattern: &CachePattern) -> CacheResult<u64> {
        self.policy(pattern.namespace())?;
        let hot_removed = self.hot.invalidate_pattern(pattern);
        let removed = match self.store.delete_by_pattern(pattern).await {
            Ok(count) => count,
            Err(e) => {
                self.absorb("delete_pattern", pattern, &e);
                0
            }
        };
        debug!(pattern = %pattern, hot_removed, removed, "Invalidated pattern");
        Ok(removed)
    }

    pub async fn health(&self) -> CacheHealth {
        let distributed = match self.store.ping().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "Distributed cache health check failed");
                false
            }
        };
        CacheHealth {
            distributed,
            hot_enabled: self.hot.is_enabled(),
            hot_entries: self.hot.len(),
            inflight: self.inflight.lock().len(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats
            .snapshot(self.hot.len(), self.hot.evictions(), self.hot.expirations())
    }

    /// Effective policies.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey, policy: &NamespacePolicy) -> Option<T> {
        let namespace = key.namespace();
        let hot = self.uses_hot_tier(policy);

        if hot {
            if let Some(payload) = self.hot.get(key) {
                match serde_json::from_slice(&payload) {
                    Ok(value) => {
                        self.stats.hot_hit();
                        CacheMetrics::lookup(namespace, Tier::Hot, true);
                        debug!(key = %key, "Hot cache hit");
                        return Some(value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Hot cache value does not match requested type");
                        self.hot.invalidate(key);
                    }
                }
            }
            self.stats.hot_miss();
            CacheMetrics::lookup(namespace, Tier::Hot, false);
        }

        let stored = match self.store.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                self.absorb("get", key, &e);
                None
            }
        };

        let decoded = stored.map(|bytes| {
            let payload = self.codec.decode_payload(&bytes)?;
            let value = serde_json::from_slice::<T>(&payload)
                .map_err(|e| CacheError::corrupt(format!("invalid payload: {e}")))?;
            Ok::<_, CacheError>((payload, value))
        });

        match decoded {
            Some(Ok((payload, value))) => {
                self.stats.distributed_hit();
                CacheMetrics::lookup(namespace, Tier::Distributed, true);
                debug!(key = %key, "Distributed cache hit");
                if hot {
                    self.hot.put(key.clone(), payload.into(), policy.ttl_for(key.attribute()));
                }
                Some(value)
            }
            Some(Err(e)) => {
                self.stats.corrupt_entry();
                CacheMetrics::corrupt_entry(namespace);
                warn!(key = %key, error = %e, "Discarding corrupt cache entry");
                if let Err(e) = self.store.delete(key).await {
                    self.absorb("delete", key, &e);
                }
                self.record_distributed_miss(key);
                None
            }
            None => {
                self.record_distributed_miss(key);
                None
            }
        }
    }

    fn record_distributed_miss(&self, key: &CacheKey) {
        self.stats.distributed_miss();
        CacheMetrics::lookup(key.namespace(), Tier::Distributed, false);
        debug!(key = %key, "Cache miss");
    }

    fn join(&self, key: &CacheKey) -> Role {
        let mut inflight = self.inflight.lock();
        if let Some(tx) = inflight.get(key) {
            return Role::Waiter(tx.subscribe());
        }

        let tx = Arc::new(watch::Sender::new(FlightState::Running));
        inflight.insert(key.clone(), Arc::clone(&tx));
        Role::Leader(FlightGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
            tx,
        })
    }

    /// Waits for the leader. `None` means it failed or was dropped.
    async fn wait(mut rx: watch::Receiver<FlightState>) -> Option<Arc<[u8]>> {
        let _gauge = WaiterGauge::enter();
        let state = rx
            .wait_for(|state| !matches!(state, FlightState::Running))
            .await
            .ok()?;
        match &*state {
            FlightState::Ready(payload) => Some(Arc::clone(payload)),
            FlightState::Running | FlightState::Abandoned => None,
        }
    }

    async fn write_tiers(&self, key: &CacheKey, policy: &NamespacePolicy, payload: &Arc<[u8]>) {
        if self.uses_hot_tier(policy) {
            self.hot.put(key.clone(), Arc::clone(payload), policy.ttl_for(key.attribute()));
        }

        let ttl_secs = policy.store_ttl_secs(key.attribute());
        let encoded = match self.codec.encode_payload(payload, policy.compressible) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };
        let (compressed, raw_len, stored_len) = (encoded.compressed, encoded.raw_len, encoded.stored_len);

        match self.store.set_with_ttl(key, encoded.bytes, ttl_secs).await {
            Ok(()) => debug!(key = %key, ttl_secs, compressed, raw_len, stored_len, "Cached value"),
            Err(e) => self.absorb("set", key, &e),
        }
    }

    fn absorb(&self, operation: &str, target: &dyn std::fmt::Display, error: &CacheError) {
        if error.is_retriable() {
            self.stats.backend_error();
        }
        warn!(operation, key = %target, error = %error, "Distributed cache operation failed, continuing without it");
    }
}
