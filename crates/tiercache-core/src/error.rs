//! Unified error type for all cache layers.

use thiserror::Error;

/// Unified error type for Tiercache.
///
/// Variants fall into three classes: programmer errors that always reach
/// the caller, storage degradation that the orchestrator absorbs as a miss,
/// and startup configuration errors.
#[derive(Error, Debug)]
pub enum CacheError {
    // ============ Programmer Errors ============
    /// Namespace is not part of the enumerated set.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// A key or pattern segment violates the segment rules.
    #[error("Invalid segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: &'static str },

    /// Attempted to store an entry without a positive TTL.
    #[error("Invalid TTL: {0}s (entries must expire)")]
    InvalidTtl(i64),

    /// Namespace is excluded from caching.
    #[error("Namespace not cacheable: {0}")]
    NamespaceNotCacheable(String),

    /// Value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Storage Errors ============
    /// Stored entry failed to decode.
    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),

    /// Distributed store is unreachable, timed out, or its pool is exhausted.
    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    // ============ Startup Errors ============
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CacheError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidNamespace(_) => "INVALID_NAMESPACE",
            Self::InvalidSegment { .. } => "INVALID_SEGMENT",
            Self::InvalidTtl(_) => "INVALID_TTL",
            Self::NamespaceNotCacheable(_) => "NAMESPACE_NOT_CACHEABLE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::CorruptEntry(_) => "CORRUPT_ENTRY",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates an invalid segment error.
    #[must_use]
    pub fn invalid_segment<T: Into<String>>(segment: T, reason: &'static str) -> Self {
        Self::InvalidSegment {
            segment: segment.into(),
            reason,
        }
    }

    /// Creates a backend unavailable error.
    #[must_use]
    pub fn backend_unavailable<T: Into<String>>(message: T) -> Self {
        Self::BackendUnavailable(message.into())
    }

    /// Creates a corrupt entry error.
    #[must_use]
    pub fn corrupt<T: Into<String>>(message: T) -> Self {
        Self::CorruptEntry(message.into())
    }

    /// Checks if this error is a caller mistake that must be surfaced.
    #[must_use]
    pub const fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidNamespace(_)
                | Self::InvalidSegment { .. }
                | Self::InvalidTtl(_)
                | Self::NamespaceNotCacheable(_)
                | Self::Serialization(_)
        )
    }

    /// Checks if this error is storage degradation that reads as a miss.
    #[must_use]
    pub const fn is_absorbed(&self) -> bool {
        matches!(self, Self::CorruptEntry(_) | Self::BackendUnavailable(_))
    }

    /// Checks if the operation may succeed when attempted again.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
