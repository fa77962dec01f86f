//! Redis-backed distributed tier.

use crate::metrics::StoreMetrics;
use crate::store::{validate_ttl, DistributedStore, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::future::Future;
use std::time::{Duration, Instant};
use tiercache_config::{CacheConfig, RedisConfig};
use tiercache_core::{CacheError, CacheKey, CachePattern};
use tiercache_resilience::{with_timeout, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use tracing::{debug, info};

/// Build a Redis connection pool without touching the server.
///
/// Connections are opened lazily on first use. The pool never grows past
/// `pool_size`; a caller that cannot get a connection within
/// `pool_wait_timeout_ms` fails as unavailable.
pub fn build_pool(config: &RedisConfig) -> StoreResult<Pool> {
    Config::from_url(&config.url)
        .builder()
        .map_err(|e| CacheError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .wait_timeout(Some(config.pool_wait_timeout()))
        .create_timeout(Some(config.connect_timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| CacheError::Configuration(format!("Failed to create pool: {}", e)))
}

/// Create a Redis connection pool and verify it with `PING`.
pub async fn create_pool(config: &RedisConfig) -> StoreResult<Pool> {
    info!("Creating Redis connection pool for cache...");

    let pool = build_pool(config)?;

    // Test connection
    let mut conn = pool
        .get()
        .await
        .map_err(|e| CacheError::backend_unavailable(format!("Failed to get Redis connection: {}", e)))?;
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| CacheError::backend_unavailable(format!("Redis PING failed: {}", e)))?;

    info!(max_size = config.pool_size, "Redis connection pool created successfully");

    Ok(pool)
}

/// Redis implementation of [`DistributedStore`].
///
/// Every command runs under the command timeout, inside the retry policy,
/// behind the circuit breaker.
pub struct RedisStore {
    pool: Pool,
    prefix: String,
    scan_count: usize,
    command_timeout: Duration,
    retry: RetryPolicy,
    breaker: Option<CircuitBreaker>,
}

impl RedisStore {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: Pool, config: &RedisConfig, retry: RetryPolicy, breaker: Option<CircuitBreaker>) -> Self {
        Self {
            pool,
            prefix: config.key_prefix.clone(),
            scan_count: config.scan_count,
            command_timeout: config.command_timeout(),
            retry,
            breaker,
        }
    }

    /// Builds the pool and resilience layers from configuration.
    pub async fn connect(config: &CacheConfig) -> StoreResult<Self> {
        let pool = create_pool(&config.redis).await?;
        let breaker = config
            .breaker
            .enabled
            .then(|| CircuitBreaker::new("redis", CircuitBreakerConfig::from(&config.breaker)));
        Ok(Self::new(pool, &config.redis, RetryPolicy::from(&config.retry), breaker))
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn execute<T, F, Fut>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let started = Instant::now();
        let pool = &self.pool;
        let command_timeout = self.command_timeout;
        let f = &f;

        let attempt = move || async move {
            let conn = pool
                .get()
                .await
                .map_err(|e| CacheError::backend_unavailable(format!("{operation}: pool: {e}")))?;
            with_timeout(command_timeout, operation, move || async move {
                f(conn)
                    .await
                    .map_err(|e| CacheError::backend_unavailable(format!("{operation}: {e}")))
            })
            .await
        };

        let result = match &self.breaker {
            Some(breaker) => breaker.call(|| self.retry.execute(operation, attempt)).await,
            None => self.retry.execute(operation, attempt).await,
        };

        StoreMetrics::operation_duration(operation, started.elapsed());
        if matches!(result, Err(CacheError::BackendUnavailable(_))) {
            StoreMetrics::backend_error(operation);
        }
        result
    }
}

#[async_trait]
impl DistributedStore for RedisStore {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key.as_str());
        let k = full_key.as_str();

        let value = self
            .execute("get", move |mut conn| async move { conn.get::<_, Option<Vec<u8>>>(k).await })
            .await?;

        match &value {
            Some(_) => debug!(key = %key, "Redis hit"),
            None => debug!(key = %key, "Redis miss"),
        }
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &CacheKey, value: Vec<u8>, ttl_secs: i64) -> StoreResult<()> {
        let ttl = validate_ttl(ttl_secs)?;
        let full_key = self.full_key(key.as_str());
        let k = full_key.as_str();
        let v = value.as_slice();

        self.execute("set", move |mut conn| async move { conn.set_ex::<_, _, ()>(k, v, ttl).await })
            .await?;

        debug!(key = %key, ttl_secs = ttl, bytes = value.len(), "Stored entry in Redis");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> StoreResult<bool> {
        let full_key = self.full_key(key.as_str());
        let k = full_key.as_str();

        let deleted = self
            .execute("delete", move |mut conn| async move { conn.unlink::<_, i64>(k).await })
            .await?;

        debug!(key = %key, deleted = deleted > 0, "Deleted key from Redis");
        Ok(deleted > 0)
    }

    async fn delete_by_pattern(&self, pattern: &CachePattern) -> StoreResult<u64> {
        let full_pattern = self.full_key(pattern.as_str());
        let p = full_pattern.as_str();
        let count = self.scan_count;

        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys) = self
                .execute("scan", move |mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(p)
                        .arg("COUNT")
                        .arg(count)
                        .query_async::<(u64, Vec<String>)>(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let batch = keys.as_slice();
                removed += self
                    .execute("unlink", move |mut conn| async move {
                        redis::cmd("UNLINK").arg(batch).query_async::<u64>(&mut conn).await
                    })
                    .await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, removed, "Deleted keys matching pattern from Redis");
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<bool> {
        let reply = self
            .execute("ping", |mut conn| async move { redis::cmd("PING").query_async::<String>(&mut conn).await })
            .await?;
        Ok(reply == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercache_core::Namespace;

    // Nothing listens on port 1, so every connection attempt is refused.
    fn unreachable_config() -> RedisConfig {
        RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            pool_wait_timeout_ms: 200,
            connect_timeout_ms: 200,
            command_timeout_ms: 200,
            ..Default::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn breaker(failure_threshold: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "redis",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 1,
                open_timeout: Duration::from_secs(60),
            },
        )
    }

    fn unreachable_store(breaker: Option<CircuitBreaker>) -> RedisStore {
        let config = unreachable_config();
        let pool = build_pool(&config).unwrap();
        RedisStore::new(pool, &config, fast_retry(), breaker)
    }

    fn key() -> CacheKey {
        CacheKey::new(Namespace::User, "u-1", None).unwrap()
    }

    #[test]
    fn test_build_pool_does_not_connect() {
        assert!(build_pool(&unreachable_config()).is_ok());
    }

    #[test]
    fn test_build_pool_rejects_bad_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(build_pool(&config), Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_unavailable() {
        let store = unreachable_store(None);

        assert!(matches!(store.get(&key()).await, Err(CacheError::BackendUnavailable(ref m)) if m.starts_with("get: pool")));
        assert!(matches!(
            store.set_with_ttl(&key(), b"v".to_vec(), 30).await,
            Err(CacheError::BackendUnavailable(_))
        ));
        assert!(matches!(store.delete(&key()).await, Err(CacheError::BackendUnavailable(_))));
        assert!(matches!(
            store
                .delete_by_pattern(&CachePattern::namespace_wide(Namespace::User))
                .await,
            Err(CacheError::BackendUnavailable(ref m)) if m.starts_with("scan")
        ));
        assert!(matches!(store.ping().await, Err(CacheError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_invalid_ttl_rejected_before_connecting() {
        let store = unreachable_store(Some(breaker(1)));

        for ttl in [0, -5] {
            assert!(matches!(
                store.set_with_ttl(&key(), b"v".to_vec(), ttl).await,
                Err(CacheError::InvalidTtl(t)) if t == ttl
            ));
        }

        // Any command that reached the pool would have opened the breaker.
        assert!(matches!(store.get(&key()).await, Err(CacheError::BackendUnavailable(ref m)) if m.starts_with("get: pool")));
    }

    #[tokio::test]
    async fn test_repeated_failures_open_breaker() {
        let store = unreachable_store(Some(breaker(2)));

        for _ in 0..2 {
            assert!(matches!(store.get(&key()).await, Err(CacheError::BackendUnavailable(ref m)) if m.contains("pool")));
        }

        let started = Instant::now();
        let result = store.get(&key()).await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable(ref m)) if m == "circuit 'redis' is open"));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
