//! Configuration validation.
//!
//! Collects every problem in one pass and fails fast at startup rather
//! than at the first cache call.

use crate::{BreakerConfig, CacheConfig, CompressionConfig, HotCacheConfig, PolicyTable, RedisConfig, RetryConfig, WarmerConfig};
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// URL format is invalid.
    InvalidUrl { message: String },
    /// Key prefix would act as a glob during pattern deletion.
    InvalidKeyPrefix { prefix: String },
    /// A count that must be positive is zero.
    ZeroValue { name: String },
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String },
    /// Backoff multiplier below 1.0 would shrink delays.
    InvalidMultiplier { value: f64 },
    /// Gzip level outside 0-9.
    InvalidCompressionLevel { value: u32 },
    /// Decompression limit smaller than the compression threshold.
    DecompressionLimitTooSmall { limit: usize, threshold: usize },
    /// Namespace policy table rejected.
    InvalidPolicy { message: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { message } => write!(f, "Invalid redis URL: {}", message),
            Self::InvalidKeyPrefix { prefix } => {
                write!(f, "Invalid redis key prefix '{}': glob metacharacters are not allowed", prefix)
            }
            Self::ZeroValue { name } => write!(f, "'{}' must be greater than zero", name),
            Self::NonPositiveTimeout { name } => write!(f, "Timeout '{}' must be positive", name),
            Self::InvalidMultiplier { value } => {
                write!(f, "Invalid retry multiplier: {} (must be >= 1.0)", value)
            }
            Self::InvalidCompressionLevel { value } => {
                write!(f, "Invalid compression level: {} (must be 0-9)", value)
            }
            Self::DecompressionLimitTooSmall { limit, threshold } => write!(
                f,
                "max_decompressed_bytes ({}) must not be below threshold_bytes ({})",
                limit, threshold
            ),
            Self::InvalidPolicy { message } => write!(f, "Invalid namespace policy: {}", message),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    fn require_positive(&mut self, name: &str, value: u64) {
        if value == 0 {
            self.add_error(ConfigValidationError::ZeroValue { name: name.to_string() });
        }
    }

    fn require_timeout(&mut self, name: &str, value: u64) {
        if value == 0 {
            self.add_error(ConfigValidationError::NonPositiveTimeout { name: name.to_string() });
        }
    }

    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the validation errors.
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }

    /// Converts to Result, returning Err with all errors if any exist.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire cache configuration.
    pub fn validate(config: &CacheConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        Self::validate_redis(&config.redis, &mut result);
        Self::validate_retry(&config.retry, &mut result);
        Self::validate_breaker(&config.breaker, &mut result);
        Self::validate_hot_cache(&config.hot_cache, &mut result);
        Self::validate_compression(&config.compression, &mut result);
        Self::validate_warmer(&config.warmer, &mut result);

        if let Err(e) = PolicyTable::from_overrides(&config.namespaces) {
            result.add_error(ConfigValidationError::InvalidPolicy { message: e.to_string() });
        }

        result.into_result()
    }

    fn validate_redis(config: &RedisConfig, result: &mut ValidationResult) {
        if !config.enabled {
            return;
        }

        if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
            result.add_error(ConfigValidationError::InvalidUrl {
                message: "URL must start with redis:// or rediss://".to_string(),
            });
        }

        if config.key_prefix.contains(['*', '?', '[', ']', '\\']) {
            result.add_error(ConfigValidationError::InvalidKeyPrefix {
                prefix: config.key_prefix.clone(),
            });
        }

        result.require_positive("redis.pool_size", config.pool_size as u64);
        result.require_positive("redis.scan_count", config.scan_count as u64);
        result.require_timeout("redis.pool_wait_timeout_ms", config.pool_wait_timeout_ms);
        result.require_timeout("redis.connect_timeout_ms", config.connect_timeout_ms);
        result.require_timeout("redis.command_timeout_ms", config.command_timeout_ms);
    }

    fn validate_retry(config: &RetryConfig, result: &mut ValidationResult) {
        result.require_positive("retry.max_attempts", u64::from(config.max_attempts));
        if config.multiplier < 1.0 {
            result.add_error(ConfigValidationError::InvalidMultiplier { value: config.multiplier });
        }
    }

    fn validate_breaker(config: &BreakerConfig, result: &mut ValidationResult) {
        if !config.enabled {
            return;
        }
        result.require_positive("breaker.failure_threshold", config.failure_threshold);
        result.require_positive("breaker.success_threshold", config.success_threshold);
        result.require_timeout("breaker.open_timeout_ms", config.open_timeout_ms);
    }

    fn validate_hot_cache(config: &HotCacheConfig, result: &mut ValidationResult) {
        if config.capacity > 0 {
            result.require_timeout("hot_cache.ttl_secs", config.ttl_secs);
        }
    }

    fn validate_compression(config: &CompressionConfig, result: &mut ValidationResult) {
        if config.level > 9 {
            result.add_error(ConfigValidationError::InvalidCompressionLevel { value: config.level });
        }
        if config.max_decompressed_bytes < config.threshold_bytes {
            result.add_error(ConfigValidationError::DecompressionLimitTooSmall {
                limit: config.max_decompressed_bytes,
                threshold: config.threshold_bytes,
            });
        }
    }

    fn validate_warmer(config: &WarmerConfig, result: &mut ValidationResult) {
        if !config.enabled {
            return;
        }
        result.require_timeout("warmer.interval_secs", config.interval_secs);
        result.require_positive("warmer.max_candidates", config.max_candidates as u64);
        result.require_positive("warmer.concurrency", config.concurrency as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NamespaceOverride;
    use tiercache_core::Namespace;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&CacheConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = CacheConfig::default();
        config.redis.url = "http://cache".to_string();
        config.redis.pool_size = 0;
        config.retry.max_attempts = 0;
        config.warmer.concurrency = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| matches!(e, ConfigValidationError::InvalidUrl { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigValidationError::ZeroValue { name } if name == "retry.max_attempts")));
    }

    #[test]
    fn test_disabled_redis_skips_redis_checks() {
        let mut config = CacheConfig::default();
        config.redis.enabled = false;
        config.redis.url = String::new();
        config.redis.pool_size = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_glob_key_prefix_rejected() {
        let mut config = CacheConfig::default();
        config.redis.key_prefix = "prod*:".to_string();
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(errors[0], ConfigValidationError::InvalidKeyPrefix { .. }));
    }

    #[test]
    fn test_session_policy_rejected() {
        let mut config = CacheConfig::default();
        config.namespaces.insert(
            Namespace::Session,
            NamespaceOverride {
                cacheable: Some(true),
                ..Default::default()
            },
        );
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(errors[0], ConfigValidationError::InvalidPolicy { .. }));
    }

    #[test]
    fn test_compression_bounds() {
        let mut config = CacheConfig::default();
        config.compression.level = 12;
        config.compression.max_decompressed_bytes = 10;
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_disabled_hot_cache_allows_zero_ttl() {
        let mut config = CacheConfig::default();
        config.hot_cache.capacity = 0;
        config.hot_cache.ttl_secs = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
