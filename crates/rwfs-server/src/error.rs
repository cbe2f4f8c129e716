//! Startup errors
//!
//! Nothing here is produced once the server is running: per-request
//! failures become responses, not errors.

use std::io;
use std::net::SocketAddr;

use rwfs_core::CoreError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("signal setup failed: {0}")]
    Signal(#[source] io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
