//! Listener and accept loop
//!
//! `Server::run` accepts connections and submits them to the worker pool.
//! When every worker is busy and the queue is full, `run` blocks in
//! `submit` and stops accepting until a slot frees up.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rwfs_core::LockRegistry;
use rwfs_http::Connection;
use tracing::{debug, info, warn};

use crate::audit::{AuditSink, StderrAudit};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::signal;

pub struct Server {
    listener: TcpListener,
    pool: WorkerPool<TcpStream>,
    pipeline: Arc<Pipeline>,
    stop: Arc<AtomicBool>,
}

/// Stops a running accept loop from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the blocked accept.
        if let Err(e) = TcpStream::connect(self.addr) {
            debug!(error = %e, "wakeup connect failed");
        }
    }
}

impl Server {
    /// Bind with audit records going to stderr
    pub fn bind(config: ServerConfig) -> ServerResult<Self> {
        let audit = Arc::new(StderrAudit::new(config.flush_audit));
        Self::bind_with_audit(config, audit)
    }

    pub fn bind_with_audit(config: ServerConfig, audit: Arc<dyn AuditSink>) -> ServerResult<Self> {
        config.validate()?;
        signal::ignore_sigpipe()?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;

        let registry = LockRegistry::new(config.buckets, config.reader_batch)?;
        let pipeline = Arc::new(Pipeline::new(registry, audit, config.root.clone()));

        let p = Arc::clone(&pipeline);
        let pool = WorkerPool::new(
            config.workers,
            config.effective_queue_capacity(),
            move |stream: TcpStream| p.handle(&mut Connection::new(stream)),
        )?;

        info!(
            addr = %listener.local_addr()?,
            workers = config.workers,
            queue = config.effective_queue_capacity(),
            reader_batch = config.reader_batch,
            root = %config.root.display(),
            "listening"
        );

        Ok(Self {
            listener,
            pool,
            pipeline,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> io::Result<StopHandle> {
        Ok(StopHandle {
            stop: Arc::clone(&self.stop),
            addr: wake_addr(self.local_addr()?),
        })
    }

    /// Accept until a [`StopHandle`] fires
    pub fn run(&self) -> ServerResult<()> {
        for incoming in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            self.pool.submit(stream)?;
        }
        Ok(())
    }

    /// Drain the pool and tear down the lock registry
    ///
    /// Returns the number of locks released.
    pub fn shutdown(self) -> usize {
        self.pool.shutdown();
        match Arc::try_unwrap(self.pipeline) {
            Ok(pipeline) => {
                let released = pipeline.into_registry().shutdown();
                info!(locks = released, "server stopped");
                released
            }
            Err(_) => {
                warn!("pipeline still shared; registry left to process exit");
                0
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.local_addr().ok())
            .field("pool", &self.pool)
            .finish()
    }
}

/// Connectable form of a listening address
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}
