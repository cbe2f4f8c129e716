//! Audit records
//!
//! One line per answered request, `METHOD,/URI,STATUS,REQUEST-ID`. These
//! are written raw rather than through `tracing` so their format does not
//! depend on the subscriber.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use rwfs_http::Status;

/// Method label used for requests that are neither GET nor PUT
pub const UNSUPPORTED: &str = "UNSUPPORTED";

#[derive(Debug, Clone, Copy)]
pub struct AuditRecord<'a> {
    pub method: &'a str,
    /// URI without its leading slash
    pub uri: &'a str,
    pub status: Status,
    pub request_id: &'a str,
}

impl fmt::Display for AuditRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},/{},{},{}",
            self.method,
            self.uri,
            self.status.code(),
            self.request_id
        )
    }
}

/// Destination for audit records, shared by all workers
pub trait AuditSink: Send + Sync {
    fn record(&self, rec: &AuditRecord<'_>);
}

/// Writes each record to stderr under the stderr lock
#[derive(Debug, Clone, Copy)]
pub struct StderrAudit {
    flush: bool,
}

impl StderrAudit {
    pub fn new(flush: bool) -> Self {
        Self { flush }
    }
}

impl AuditSink for StderrAudit {
    fn record(&self, rec: &AuditRecord<'_>) {
        let mut err = io::stderr().lock();
        // Nowhere left to report a failing stderr.
        let _ = writeln!(err, "{}", rec);
        if self.flush {
            let _ = err.flush();
        }
    }
}

/// Keeps formatted records in memory
#[derive(Debug, Default)]
pub struct MemoryAudit {
    lines: Mutex<Vec<String>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, rec: &AuditRecord<'_>) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rec.to_string());
    }
}
