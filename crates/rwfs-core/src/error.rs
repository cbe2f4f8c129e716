//! Error types for rwfs core primitives

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An internal mutex was poisoned by a panicking thread
    #[error("internal lock poisoned: {0}")]
    Poisoned(&'static str),

    /// Map key is longer than the accepted bound
    #[error("key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    /// Map key is empty
    #[error("empty key")]
    EmptyKey,

    /// Reader batch must admit at least one reader
    #[error("reader batch must be at least 1")]
    InvalidReaderBatch,

    /// Bucket count must be non-zero
    #[error("bucket count must be at least 1")]
    InvalidBuckets,

    /// Queue capacity must be non-zero
    #[error("queue capacity must be at least 1")]
    InvalidCapacity,
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CoreError::Poisoned("mutex")
    }
}
