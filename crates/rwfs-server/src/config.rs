//! Server configuration
//!
//! Compiled-in defaults, overridden by environment, then by whatever the
//! caller sets through the builder (the CLI applies `-t` and the port last).
//!
//! ```rust,ignore
//! use rwfs_server::ServerConfig;
//!
//! let config = ServerConfig::from_env().workers(8).port(8080);
//! config.validate()?;
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use rwfs_core::constants::{DEFAULT_BUCKETS, DEFAULT_READER_BATCH, DEFAULT_WORKERS};
use rwfs_core::env::{env_get, env_get_bool, env_get_opt, env_get_str};

use crate::error::{ServerError, ServerResult};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker threads
    pub workers: usize,
    /// Pending-connection queue size; `None` follows `workers`
    pub queue_capacity: Option<usize>,
    /// Readers admitted per lock while a writer waits
    pub reader_batch: usize,
    /// Lock registry bucket count
    pub buckets: usize,
    /// Directory request URIs resolve under
    pub root: PathBuf,
    /// Flush stderr after each audit line
    pub flush_audit: bool,
    pub host: IpAddr,
    /// `0` picks an ephemeral port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Library defaults, no environment lookups
    pub fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: None,
            reader_batch: DEFAULT_READER_BATCH,
            buckets: DEFAULT_BUCKETS,
            root: PathBuf::from("."),
            flush_audit: true,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }

    /// Defaults with environment overrides
    ///
    /// - `RWFS_WORKERS` - worker threads
    /// - `RWFS_QUEUE_CAPACITY` - pending-connection queue size
    /// - `RWFS_READER_BATCH` - readers admitted while a writer waits
    /// - `RWFS_BUCKETS` - lock registry buckets
    /// - `RWFS_ROOT` - document root
    /// - `RWFS_FLUSH_AUDIT` - flush after each audit line (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            workers: env_get("RWFS_WORKERS", base.workers),
            queue_capacity: env_get_opt("RWFS_QUEUE_CAPACITY"),
            reader_batch: env_get("RWFS_READER_BATCH", base.reader_batch),
            buckets: env_get("RWFS_BUCKETS", base.buckets),
            root: PathBuf::from(env_get_str("RWFS_ROOT", ".")),
            flush_audit: env_get_bool("RWFS_FLUSH_AUDIT", base.flush_audit),
            ..base
        }
    }

    // Builder methods

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = Some(cap);
        self
    }

    pub fn reader_batch(mut self, n: usize) -> Self {
        self.reader_batch = n;
        self
    }

    pub fn buckets(mut self, n: usize) -> Self {
        self.buckets = n;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn flush_audit(mut self, flush: bool) -> Self {
        self.flush_audit = flush;
        self
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.workers == 0 {
            return Err(ServerError::InvalidConfig("workers must be > 0"));
        }
        if self.effective_queue_capacity() == 0 {
            return Err(ServerError::InvalidConfig("queue_capacity must be > 0"));
        }
        if self.reader_batch == 0 {
            return Err(ServerError::InvalidConfig("reader_batch must be > 0"));
        }
        if self.buckets == 0 {
            return Err(ServerError::InvalidConfig("buckets must be > 0"));
        }
        if !self.root.is_dir() {
            return Err(ServerError::InvalidConfig("root must be an existing directory"));
        }
        Ok(())
    }
}
