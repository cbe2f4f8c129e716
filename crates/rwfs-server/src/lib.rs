//! # rwfs-server
//!
//! Runs the rwfs file server: an acceptor feeds a bounded queue, a fixed
//! pool of worker threads drains it, and each connection goes through the
//! request pipeline under the per-file locks of a shared registry.
//!
//! ```text
//! Server::run ──push──▶ BoundedQueue ──pop──▶ WorkerPool ──▶ Pipeline
//!                                                             │
//!                                        LockRegistry ◀───────┘
//!                                             │
//!                                        ResourceLock ──▶ filesystem
//! ```
//!
//! ## Modules
//!
//! - `config` - `ServerConfig` (env defaults + builder)
//! - `audit` - Per-request audit records
//! - `pool` - Fixed worker pool
//! - `pipeline` - GET / PUT / unsupported handlers
//! - `server` - Listener and accept loop
//! - `signal` - Process signal setup
//! - `error` - Startup errors

pub mod config;
pub mod audit;
pub mod pool;
pub mod pipeline;
pub mod server;
pub mod signal;
pub mod error;

pub use config::ServerConfig;
pub use audit::{AuditRecord, AuditSink, MemoryAudit, StderrAudit};
pub use pool::WorkerPool;
pub use pipeline::Pipeline;
pub use server::Server;
pub use error::{ServerError, ServerResult};
