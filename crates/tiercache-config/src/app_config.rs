//! Cache configuration structures.

use crate::NamespacePolicies;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiercache_core::telemetry::LoggingConfig;

/// Root cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Distributed tier connection settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Retry policy for distributed tier commands.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker guarding the distributed tier.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// In-process hot tier.
    #[serde(default)]
    pub hot_cache: HotCacheConfig,

    /// Payload compression.
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Scheduled cache warming.
    #[serde(default)]
    pub warmer: WarmerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-namespace TTL policy overrides.
    #[serde(default)]
    pub namespaces: NamespacePolicies,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            redis: RedisConfig::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            hot_cache: HotCacheConfig::default(),
            compression: CompressionConfig::default(),
            warmer: WarmerConfig::default(),
            logging: LoggingConfig::default(),
            namespaces: NamespacePolicies::default(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Enable Redis (the in-memory store is used when disabled).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long a caller waits for a pooled connection, in milliseconds.
    #[serde(default = "default_pool_wait_timeout")]
    pub pool_wait_timeout_ms: u64,

    /// Timeout for establishing a new connection, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single command, in milliseconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Prefix prepended to every stored key (empty for none).
    #[serde(default)]
    pub key_prefix: String,

    /// `COUNT` hint for `SCAN` during pattern deletion.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            enabled: true,
            pool_size: default_pool_size(),
            pool_wait_timeout_ms: default_pool_wait_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            command_timeout_ms: default_command_timeout(),
            key_prefix: String::new(),
            scan_count: default_scan_count(),
        }
    }
}

impl RedisConfig {
    #[must_use]
    pub const fn pool_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_wait_timeout_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> usize {
    16
}

fn default_pool_wait_timeout() -> u64 {
    500
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_command_timeout() -> u64 {
    2000
}

fn default_scan_count() -> usize {
    500
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per command, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Whether to add jitter to delays.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    50
}

fn default_max_delay() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Enable the breaker.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failed commands before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,

    /// Successful probes needed to close it again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u64,

    /// How long the breaker stays open before probing, in milliseconds.
    #[serde(default = "default_open_timeout")]
    pub open_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_ms: default_open_timeout(),
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

fn default_failure_threshold() -> u64 {
    5
}

fn default_success_threshold() -> u64 {
    2
}

fn default_open_timeout() -> u64 {
    10_000
}

/// Hot cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotCacheConfig {
    /// Maximum number of entries (0 disables the tier).
    #[serde(default = "default_hot_capacity")]
    pub capacity: usize,

    /// Per-entry TTL in seconds, capped by the namespace TTL.
    #[serde(default = "default_hot_ttl")]
    pub ttl_secs: u64,
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_hot_capacity(),
            ttl_secs: default_hot_ttl(),
        }
    }
}

impl HotCacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_hot_capacity() -> usize {
    1000
}

fn default_hot_ttl() -> u64 {
    60
}

/// Compression configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Payloads strictly larger than this are compressed.
    #[serde(default = "default_threshold")]
    pub threshold_bytes: usize,

    /// Upper bound on a decompressed payload.
    #[serde(default = "default_max_decompressed")]
    pub max_decompressed_bytes: usize,

    /// Gzip level (0-9).
    #[serde(default = "default_level")]
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: default_threshold(),
            max_decompressed_bytes: default_max_decompressed(),
            level: default_level(),
        }
    }
}

fn default_threshold() -> usize {
    1024
}

fn default_max_decompressed() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_level() -> u32 {
    6
}

/// Cache warmer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmerConfig {
    /// Enable the warmer.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between runs in seconds.
    #[serde(default = "default_warm_interval")]
    pub interval_secs: u64,

    /// Upper bound on candidates requested per run.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Candidates warmed concurrently.
    #[serde(default = "default_warm_concurrency")]
    pub concurrency: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_warm_interval(),
            max_candidates: default_max_candidates(),
            concurrency: default_warm_concurrency(),
        }
    }
}

impl WarmerConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_warm_interval() -> u64 {
    1800 // 30 minutes
}

fn default_max_candidates() -> usize {
    500
}

fn default_warm_concurrency() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.hot_cache.capacity, 1000);
        assert_eq!(config.hot_cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.compression.threshold_bytes, 1024);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.warmer.interval(), Duration::from_secs(30 * 60));
        assert!(config.redis.command_timeout() < Duration::from_secs(5));
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"redis":{"url":"redis://cache:6379"},"hot_cache":{"capacity":10}}"#).unwrap();
        assert_eq!(config.redis.url, "redis://cache:6379");
        assert_eq!(config.redis.pool_size, 16);
        assert_eq!(config.hot_cache.capacity, 10);
        assert_eq!(config.hot_cache.ttl_secs, 60);
        assert_eq!(config.environment, "development");
    }
}
