//! HTTP transport errors

use std::io;

use thiserror::Error;

/// Result type for socket-level operations
pub type HttpResult<T> = Result<T, HttpError>;

/// Failures while moving bytes between the socket and a file
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Client closed before sending the announced body
    #[error("short body: expected {expected} bytes, received {received}")]
    ShortBody { expected: u64, received: u64 },

    /// File ended before its announced length was sent
    #[error("short file: expected {expected} bytes, sent {sent}")]
    ShortFile { expected: u64, sent: u64 },
}
