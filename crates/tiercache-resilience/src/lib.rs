//! # Tiercache Resilience
//!
//! Resilience patterns wrapped around every distributed tier call:
//! bounded retry with backoff, per-command timeout, and a circuit breaker
//! that fails fast while the backend is down.

pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::*;
pub use retry::*;
pub use timeout::*;
