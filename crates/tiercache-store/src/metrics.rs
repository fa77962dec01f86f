//! Distributed tier metrics.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names emitted by the store layer.
pub mod names {
    /// Store operation duration in seconds.
    pub const STORE_OPERATION_DURATION: &str = "tiercache_store_operation_duration_seconds";
    /// Store operations that ended in `BackendUnavailable`.
    pub const BACKEND_ERRORS_TOTAL: &str = "tiercache_backend_errors_total";
}

/// Register store metric descriptions.
pub fn register_metrics() {
    describe_histogram!(
        names::STORE_OPERATION_DURATION,
        "Distributed store operation duration in seconds"
    );
    describe_counter!(
        names::BACKEND_ERRORS_TOTAL,
        "Total number of distributed store operations that failed as unavailable"
    );
}

/// Store metrics recorder.
#[derive(Clone)]
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record operation duration.
    pub fn operation_duration(operation: &'static str, duration: Duration) {
        histogram!(names::STORE_OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());
    }

    /// Record a backend failure.
    pub fn backend_error(operation: &'static str) {
        counter!(names::BACKEND_ERRORS_TOTAL, "operation" => operation).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        register_metrics();
        StoreMetrics::operation_duration("get", Duration::from_millis(3));
        StoreMetrics::backend_error("set");
    }
}
