//! Configuration loader with layered sources.

use crate::{CacheConfig, ConfigValidator, PolicyTable};
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use tiercache_core::{CacheError, CacheResult};
use tracing::{debug, info};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TIERCACHE";

/// Loaded, validated configuration.
///
/// Read once at startup; there is no runtime refresh.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: CacheConfig,
    policies: PolicyTable,
}

impl ConfigLoader {
    /// Loads configuration from `config_dir`.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `{config_dir}/default.toml`
    /// 2. `{config_dir}/{environment}.toml`
    /// 3. `{config_dir}/local.toml`
    /// 4. Environment variables such as `TIERCACHE_REDIS__URL`
    ///
    /// The environment name comes from `TIERCACHE_ENVIRONMENT` and
    /// defaults to `development`.
    pub fn new(config_dir: impl AsRef<Path>) -> CacheResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var(format!("{ENV_PREFIX}_ENVIRONMENT"))
            .unwrap_or_else(|_| "development".to_string());
        info!("Loading cache configuration for environment: {}", environment);

        let config = Self::load_config(config_dir.as_ref(), &environment)?;
        Self::from_config(config)
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> CacheResult<Self> {
        Self::new("./config")
    }

    /// Validates an already-built configuration.
    pub fn from_config(config: CacheConfig) -> CacheResult<Self> {
        if let Err(errors) = ConfigValidator::validate(&config) {
            let message = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            return Err(CacheError::Configuration(message));
        }
        let policies = PolicyTable::from_overrides(&config.namespaces)?;
        Ok(Self { config, policies })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the effective namespace policies.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Splits into owned parts.
    #[must_use]
    pub fn into_parts(self) -> (CacheConfig, PolicyTable) {
        (self.config, self.policies)
    }

    fn load_config(config_dir: &Path, environment: &str) -> CacheResult<CacheConfig> {
        let mut builder = Config::builder();

        for name in ["default", environment, "local"] {
            let path = config_dir.join(format!("{name}.toml"));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error_to_cache_error)
    }
}

fn config_error_to_cache_error(err: ConfigError) -> CacheError {
    CacheError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tiercache_core::Namespace;

    #[test]
    fn test_missing_directory_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("absent")).unwrap();
        assert_eq!(loader.config().hot_cache.capacity, 1000);
        assert_eq!(loader.policies().get(Namespace::User).ttl_secs, 300);
    }

    #[test]
    fn test_files_layer_over_each_other() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[redis]
url = "redis://default-host:6379"
pool_size = 8

[namespaces.campaign]
ttl_secs = 900

[namespaces.lead.attributes]
score = 120
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("local.toml"),
            r#"
[redis]
url = "redis://local-host:6379"
"#,
        )
        .unwrap();

        let loader = ConfigLoader::new(dir.path()).unwrap();
        assert_eq!(loader.config().redis.url, "redis://local-host:6379");
        assert_eq!(loader.config().redis.pool_size, 8);
        assert_eq!(loader.policies().get(Namespace::Campaign).ttl_secs, 900);
        assert_eq!(loader.policies().get(Namespace::Lead).ttl_secs_for(Some("score")), 120);
        assert_eq!(loader.policies().get(Namespace::Lead).ttl_secs_for(Some("enrichment")), 604_800);
    }

    #[test]
    fn test_cacheable_session_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[namespaces.session]
cacheable = true
ttl_secs = 60
"#,
        )
        .unwrap();

        let err = ConfigLoader::new(dir.path()).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(ref msg) if msg.contains("session")));
    }

    #[test]
    fn test_invalid_values_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[retry]\nmax_attempts = 0\n").unwrap();
        let err = ConfigLoader::new(dir.path()).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(ref msg) if msg.contains("retry.max_attempts")));
    }

    #[test]
    fn test_from_config_exposes_parts() {
        let (config, policies) = ConfigLoader::from_config(CacheConfig::default()).unwrap().into_parts();
        assert_eq!(config.environment, "development");
        assert!(!policies.get(Namespace::Session).cacheable);
    }
}
