//! # rwfs-core
//!
//! Core synchronization types for the rwfs file server.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Sockets, files and signals live in `rwfs-http` and `rwfs-server`.
//!
//! ## Modules
//!
//! - `rwlock` - Reader/writer lock with a bounded reader batch (writer fairness)
//! - `chained_map` - Fixed-bucket hash map with chained entries
//! - `registry` - Path -> lock registry with atomic get-or-create
//! - `queue` - Blocking bounded FIFO used to hand off connections
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod rwlock;
pub mod chained_map;
pub mod registry;
pub mod queue;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use rwlock::{LockSnapshot, ReadGuard, ResourceLock, WriteGuard};
pub use chained_map::{ChainedMap, ExactKey, KeyCompare};
pub use registry::LockRegistry;
pub use queue::BoundedQueue;
pub use error::{CoreError, CoreResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Constants shared across the workspace
pub mod constants {
    /// Longest resource path accepted as a registry key (bytes)
    pub const MAX_KEY_LEN: usize = 254;

    /// Default bucket count for the lock registry map
    pub const DEFAULT_BUCKETS: usize = 128;

    /// Default reader batch: readers admitted while a writer waits
    pub const DEFAULT_READER_BATCH: usize = 1;

    /// Default worker count
    pub const DEFAULT_WORKERS: usize = 4;
}
