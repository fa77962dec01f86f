//! Timeout wrapper for distributed tier commands.

use std::time::Duration;
use tiercache_core::CacheError;

/// Wraps an async cache operation with a timeout.
///
/// An elapsed deadline surfaces as `BackendUnavailable`, so callers treat a
/// slow backend exactly like an unreachable one.
pub async fn with_timeout<F, Fut, T>(duration: Duration, operation: &str, f: F) -> Result<T, CacheError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, CacheError>>,
{
    tokio::time::timeout(duration, f()).await.map_err(|_| {
        CacheError::backend_unavailable(format!("{operation} timed out after {duration:?}"))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), "get", || async { Ok::<_, CacheError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_exceeded() {
        let result = with_timeout(Duration::from_millis(10), "get", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, CacheError>(42)
        })
        .await;

        match result {
            Err(CacheError::BackendUnavailable(msg)) => assert!(msg.starts_with("get timed out")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<(), _> =
            with_timeout(Duration::from_secs(1), "set", || async { Err(CacheError::InvalidTtl(-1)) }).await;
        assert!(matches!(result, Err(CacheError::InvalidTtl(-1))));
    }
}
