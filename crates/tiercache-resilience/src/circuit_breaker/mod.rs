//! Circuit breaker implementation.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tiercache_config::BreakerConfig;
use tiercache_core::CacheError;
use tracing::{debug, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed - requests are allowed.
    Closed = 0,
    /// Circuit is open - requests are rejected.
    Open = 1,
    /// Circuit is half-open - probe requests are allowed.
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive backend failures before opening the circuit.
    pub failure_threshold: u64,
    /// Successes needed to close the circuit from half-open.
    pub success_threshold: u64,
    /// Time spent open before probing again.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_timeout: config.open_timeout(),
        }
    }
}

/// Circuit breaker guarding the distributed tier.
///
/// Only `BackendUnavailable` outcomes count as failures. Programmer errors
/// and corrupt entries say nothing about backend health.
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    opened_at: Mutex<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            opened_at: Mutex::new(None),
            config,
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Returns the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    /// Returns the name of the circuit breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes a function with circuit breaker protection.
    ///
    /// While open, fails immediately with `BackendUnavailable` without
    /// invoking `f`.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CacheError>>,
    {
        if !self.allow_request() {
            return Err(CacheError::backend_unavailable(format!("circuit '{}' is open", self.name)));
        }

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_retriable() {
                    self.record_failure();
                } else {
                    self.record_success();
                }
                Err(e)
            }
        }
    }

    fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock();
                match opened_at {
                    Some(time) if time.elapsed() >= self.config.open_timeout => {
                        self.transition_to(CircuitState::HalfOpen);
                        self.success_count.store(0, Ordering::SeqCst);
                        debug!("Circuit breaker '{}' transitioning to half-open", self.name);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to(CircuitState::Closed);
                    self.failure_count.store(0, Ordering::SeqCst);
                    debug!("Circuit breaker '{}' closed after successful recovery", self.name);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.open();
                    warn!("Circuit breaker '{}' opened after {} failures", self.name, failures);
                }
            }
            CircuitState::HalfOpen => {
                self.open();
                warn!("Circuit breaker '{}' reopened after failure in half-open state", self.name);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self) {
        *self.opened_at.lock() = Some(Instant::now());
        self.transition_to(CircuitState::Open);
    }

    fn transition_to(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Resets the circuit breaker to closed state.
    pub fn reset(&self) {
        self.transition_to(CircuitState::Closed);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        *self.opened_at.lock() = None;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn breaker(failure_threshold: u64, open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "redis",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 1,
                open_timeout,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CacheError> {
        cb.call(|| async { Err(CacheError::backend_unavailable("refused")) }).await
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed() {
        let cb = CircuitBreaker::with_defaults("redis");
        assert_eq!(cb.state(), CircuitState::Closed);

        let result = cb.call(|| async { Ok::<_, CacheError>(42) }).await;
        assert_eq!(assert_ok!(result), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_and_fails_fast() {
        let cb = breaker(2, Duration::from_secs(60));

        for _ in 0..2 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let mut invoked = false;
        let result = cb
            .call(|| {
                invoked = true;
                async { Ok::<_, CacheError>(1) }
            })
            .await;
        assert!(!invoked);
        assert!(matches!(result, Err(CacheError::BackendUnavailable(ref m)) if m.contains("open")));
    }

    #[tokio::test]
    async fn test_programmer_errors_do_not_trip() {
        let cb = breaker(1, Duration::from_secs(60));
        let _ = cb.call(|| async { Err::<(), _>(CacheError::InvalidTtl(0)) }).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_recovery() {
        let cb = breaker(1, Duration::from_millis(5));
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = cb.call(|| async { Ok::<_, CacheError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(5));
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_err!(fail(&cb).await);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = breaker(1, Duration::from_secs(60));
        let _ = fail(&cb).await;
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_config_from_breaker_config() {
        let config = CircuitBreakerConfig::from(&BreakerConfig::default());
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.open_timeout, Duration::from_secs(10));
    }
}
