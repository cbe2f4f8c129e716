//! Request pipeline
//!
//! Parses one request off a connection and answers it. Every request that
//! parses gets exactly one response and one audit record; a request that
//! fails to parse gets the parser's error response and no audit record.
//!
//! Lock discipline per resource:
//!
//! - GET opens the file first (so 403/404 never touch the registry), then
//!   holds the read lock across stat, streaming and close.
//! - PUT stages the body in a private temp file with no lock held. Only a
//!   fully received body takes the write lock, and the target is truncated
//!   and rewritten entirely under it. Readers see the old bytes or the new
//!   bytes, never a mix.
//!
//! Staging files live in a subdirectory of the root. URIs cannot contain
//! `/`, so no request can name one.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rwfs_core::LockRegistry;
use rwfs_http::{xfer, Connection, Method, Request, Status};
use tracing::{debug, warn};

use crate::audit::{AuditRecord, AuditSink, UNSUPPORTED};

/// Directory under the document root that holds PUT staging files
const STAGING_DIR: &str = ".rwfs-staging";
const STAGING_PREFIX: &str = "put-";

pub struct Pipeline {
    registry: LockRegistry,
    audit: Arc<dyn AuditSink>,
    root: PathBuf,
    staging: PathBuf,
}

impl Pipeline {
    pub fn new(registry: LockRegistry, audit: Arc<dyn AuditSink>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            registry,
            audit,
            staging: root.join(STAGING_DIR),
            root,
        }
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    /// Give the registry back for teardown once no worker can reach it
    pub fn into_registry(self) -> LockRegistry {
        self.registry
    }

    /// Serve the single request on `conn`
    pub fn handle(&self, conn: &mut Connection) {
        let req = match conn.parse() {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "rejecting request");
                self.send(conn, e.response());
                return;
            }
        };

        match req.method {
            Method::Get => self.handle_get(conn, &req),
            Method::Put => self.handle_put(conn, &req),
            Method::Other(_) => self.handle_unsupported(conn, &req),
        }
    }

    fn handle_get(&self, conn: &mut Connection, req: &Request) {
        let path = self.root.join(&req.uri);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                let status = get_open_status(&e);
                if status == Status::InternalServerError {
                    warn!(uri = %req.uri, error = %e, "GET open failed");
                }
                return self.respond(conn, req, "GET", status);
            }
        };

        let lock = match self.registry.acquire_or_create(&req.uri) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(uri = %req.uri, error = %e, "no lock for resource");
                return self.respond(conn, req, "GET", Status::InternalServerError);
            }
        };
        let _guard = match lock.read_acquire() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(uri = %req.uri, error = %e, "read lock failed");
                return self.respond(conn, req, "GET", Status::InternalServerError);
            }
        };
        // Rebound after the guard so it is closed before the guard releases.
        let file = file;

        let meta = match file.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(uri = %req.uri, error = %e, "GET stat failed");
                return self.respond(conn, req, "GET", Status::InternalServerError);
            }
        };
        if meta.is_dir() {
            return self.respond(conn, req, "GET", Status::Forbidden);
        }

        match conn.send_file(&file, meta.len()) {
            Ok(()) => self.record(req, "GET", Status::Ok),
            Err(e) => {
                // The 200 head may already be out; nothing else can be sent.
                warn!(uri = %req.uri, error = %e, "GET stream failed");
                self.record(req, "GET", Status::InternalServerError);
            }
        }
    }

    fn handle_put(&self, conn: &mut Connection, req: &Request) {
        let len = req.content_length().unwrap_or(0);

        let mut staged = match std::fs::create_dir_all(&self.staging).and_then(|()| {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(&self.staging)
        }) {
            Ok(staged) => staged,
            Err(e) => {
                warn!(uri = %req.uri, error = %e, "cannot create staging file");
                return self.respond(conn, req, "PUT", Status::InternalServerError);
            }
        };

        if let Err(e) = conn.recv_file(staged.as_file_mut(), len) {
            debug!(uri = %req.uri, error = %e, "PUT body not received");
            return self.respond(conn, req, "PUT", Status::InternalServerError);
        }

        let lock = match self.registry.acquire_or_create(&req.uri) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(uri = %req.uri, error = %e, "no lock for resource");
                return self.respond(conn, req, "PUT", Status::InternalServerError);
            }
        };
        let guard = match lock.write_acquire() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(uri = %req.uri, error = %e, "write lock failed");
                return self.respond(conn, req, "PUT", Status::InternalServerError);
            }
        };

        let status = publish(&self.root.join(&req.uri), staged.as_file_mut(), len);
        if status == Status::InternalServerError {
            warn!(uri = %req.uri, "PUT publish failed");
        }
        self.record(req, "PUT", status);
        drop(staged);
        guard.release();

        self.send(conn, status);
    }

    fn handle_unsupported(&self, conn: &mut Connection, req: &Request) {
        debug!(method = req.method.as_str(), "unsupported method");
        self.respond(conn, req, UNSUPPORTED, Status::NotImplemented);
    }

    fn respond(&self, conn: &mut Connection, req: &Request, method: &str, status: Status) {
        self.send(conn, status);
        self.record(req, method, status);
    }

    fn send(&self, conn: &mut Connection, status: Status) {
        if let Err(e) = conn.send_response(status) {
            debug!(status = status.code(), error = %e, "response not delivered");
        }
    }

    fn record(&self, req: &Request, method: &str, status: Status) {
        self.audit.record(&AuditRecord {
            method,
            uri: &req.uri,
            status,
            request_id: req.request_id(),
        });
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("root", &self.root)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Replace `target` with the first `len` bytes of `staged`
///
/// Caller holds the target's write lock.
fn publish(target: &Path, staged: &mut File, len: u64) -> Status {
    let existed = target.exists();

    let mut out = match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(target)
    {
        Ok(out) => out,
        Err(e) => return put_open_status(&e),
    };

    if staged.seek(SeekFrom::Start(0)).is_err() {
        return Status::InternalServerError;
    }
    if xfer::copy_exact(staged, &mut out, len).is_err() {
        return Status::InternalServerError;
    }

    if existed {
        Status::Ok
    } else {
        Status::Created
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use nix::errno::Errno;

        fn errno(e: &io::Error) -> Option<Errno> {
            e.raw_os_error().map(Errno::from_raw)
        }

        fn get_open_status(e: &io::Error) -> Status {
            match errno(e) {
                Some(Errno::EACCES | Errno::EPERM) => Status::Forbidden,
                Some(Errno::ENOENT) => Status::NotFound,
                _ => Status::InternalServerError,
            }
        }

        fn put_open_status(e: &io::Error) -> Status {
            match errno(e) {
                Some(Errno::EACCES | Errno::EPERM | Errno::EISDIR) => Status::Forbidden,
                _ => Status::InternalServerError,
            }
        }
    } else {
        fn get_open_status(e: &io::Error) -> Status {
            match e.kind() {
                io::ErrorKind::PermissionDenied => Status::Forbidden,
                io::ErrorKind::NotFound => Status::NotFound,
                _ => Status::InternalServerError,
            }
        }

        fn put_open_status(e: &io::Error) -> Status {
            match e.kind() {
                io::ErrorKind::PermissionDenied => Status::Forbidden,
                _ => Status::InternalServerError,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAudit;
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpListener, TcpStream};
    use std::thread;
    use std::time::{Duration, Instant};

    struct Fixture {
        dir: tempfile::TempDir,
        audit: Arc<MemoryAudit>,
        pipeline: Arc<Pipeline>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(MemoryAudit::new());
        let pipeline = Arc::new(Pipeline::new(
            LockRegistry::default(),
            audit.clone(),
            dir.path(),
        ));
        Fixture { dir, audit, pipeline }
    }

    /// Send `raw`, serve it on another thread, return the full response
    fn exchange(pipeline: &Arc<Pipeline>, raw: &[u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let p = Arc::clone(pipeline);
        let worker = thread::spawn(move || p.handle(&mut Connection::new(server)));

        client.write_all(raw).unwrap();
        client.shutdown(Shutdown::Write).unwrap();
        let mut resp = String::new();
        client.read_to_string(&mut resp).unwrap();
        worker.join().unwrap();
        resp
    }

    fn status_of(resp: &str) -> u16 {
        resp[9..12].parse().unwrap()
    }

    fn staged_names(root: &Path) -> Vec<String> {
        match std::fs::read_dir(root.join(STAGING_DIR)) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn staging_files(root: &Path) -> usize {
        staged_names(root).len()
    }

    fn body_of(resp: &str) -> &str {
        let split = resp.find("\r\n\r\n").unwrap();
        &resp[split + 4..]
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_get_existing() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("a.txt"), b"contents").unwrap();

        let resp = exchange(&fx.pipeline, b"GET /a.txt HTTP/1.1\r\nRequest-Id: 5\r\n\r\n");
        assert_eq!(resp, "HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\ncontents");
        assert_eq!(fx.audit.lines(), vec!["GET,/a.txt,200,5"]);
        assert_eq!(fx.pipeline.registry().len(), 1);
    }

    #[test]
    fn test_get_missing_takes_no_lock() {
        let fx = fixture();
        let resp = exchange(&fx.pipeline, b"GET /nope HTTP/1.1\r\n\r\n");
        assert_eq!(status_of(&resp), 404);
        assert_eq!(fx.audit.lines(), vec!["GET,/nope,404,0"]);
        assert!(fx.pipeline.registry().is_empty());
    }

    #[test]
    fn test_get_directory_forbidden() {
        let fx = fixture();
        std::fs::create_dir(fx.dir.path().join("sub")).unwrap();
        let resp = exchange(&fx.pipeline, b"GET /sub HTTP/1.1\r\n\r\n");
        assert_eq!(status_of(&resp), 403);
        assert_eq!(fx.audit.lines(), vec!["GET,/sub,403,0"]);
    }

    #[test]
    fn test_put_create_then_replace() {
        let fx = fixture();
        let resp = exchange(
            &fx.pipeline,
            b"PUT /f.txt HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world",
        );
        assert_eq!(status_of(&resp), 201);

        let resp = exchange(&fx.pipeline, b"PUT /f.txt HTTP/1.1\r\nContent-Length: 3\r\n\r\nbye");
        assert_eq!(status_of(&resp), 200);

        assert_eq!(std::fs::read(fx.dir.path().join("f.txt")).unwrap(), b"bye");
        assert_eq!(fx.audit.lines(), vec!["PUT,/f.txt,201,0", "PUT,/f.txt,200,0"]);
        assert_eq!(staging_files(fx.dir.path()), 0);
    }

    #[test]
    fn test_put_short_body_leaves_target_untouched() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("keep"), b"original").unwrap();

        let resp = exchange(&fx.pipeline, b"PUT /keep HTTP/1.1\r\nContent-Length: 100\r\n\r\npartial");
        assert_eq!(status_of(&resp), 500);
        assert_eq!(std::fs::read(fx.dir.path().join("keep")).unwrap(), b"original");
        assert!(fx.pipeline.registry().is_empty(), "failed receive must not take a lock");
        assert_eq!(staging_files(fx.dir.path()), 0);
        assert_eq!(fx.audit.lines(), vec!["PUT,/keep,500,0"]);
    }

    #[test]
    fn test_put_onto_directory_forbidden() {
        let fx = fixture();
        std::fs::create_dir(fx.dir.path().join("sub")).unwrap();
        let resp = exchange(&fx.pipeline, b"PUT /sub HTTP/1.1\r\nContent-Length: 1\r\n\r\nx");
        assert_eq!(status_of(&resp), 403);
        assert_eq!(staging_files(fx.dir.path()), 0);
    }

    #[test]
    fn test_unsupported_method() {
        let fx = fixture();
        let resp = exchange(&fx.pipeline, b"DELETE /x HTTP/1.1\r\nRequest-Id: 42\r\n\r\n");
        assert_eq!(status_of(&resp), 501);
        assert_eq!(fx.audit.lines(), vec!["UNSUPPORTED,/x,501,42"]);
    }

    #[test]
    fn test_parse_failure_not_audited() {
        let fx = fixture();
        let resp = exchange(&fx.pipeline, b"GET /a HTTP/1.0\r\n\r\n");
        assert_eq!(status_of(&resp), 505);

        let resp = exchange(&fx.pipeline, b"PUT /a HTTP/1.1\r\n\r\n");
        assert_eq!(status_of(&resp), 400);
        assert!(fx.audit.lines().is_empty());
    }

    #[test]
    fn test_get_waits_for_writer() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("w"), b"x").unwrap();

        let lock = fx.pipeline.registry().acquire_or_create("w").unwrap();
        let guard = lock.write_acquire().unwrap();

        let p = Arc::clone(&fx.pipeline);
        let reader = thread::spawn(move || exchange(&p, b"GET /w HTTP/1.1\r\n\r\n"));

        thread::sleep(Duration::from_millis(100));
        assert!(fx.audit.lines().is_empty(), "GET must block behind the writer");
        assert!(lock.snapshot().waiting_readers >= 1);

        guard.release();
        let resp = reader.join().unwrap();
        assert_eq!(status_of(&resp), 200);
    }

    #[test]
    fn test_in_flight_staging_file_not_served() {
        let fx = fixture();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let p = Arc::clone(&fx.pipeline);
        let worker = thread::spawn(move || p.handle(&mut Connection::new(server)));

        client
            .write_all(b"PUT /up.txt HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello")
            .unwrap();
        wait_until("staging file", || staging_files(fx.dir.path()) == 1);

        let root_entries: Vec<_> = std::fs::read_dir(fx.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(root_entries, vec![STAGING_DIR.to_string()]);

        for name in staged_names(fx.dir.path()) {
            let resp = exchange(&fx.pipeline, format!("GET /{} HTTP/1.1\r\n\r\n", name).as_bytes());
            assert_eq!(status_of(&resp), 404, "{}", name);
        }
        let resp = exchange(&fx.pipeline, format!("GET /{} HTTP/1.1\r\n\r\n", STAGING_DIR).as_bytes());
        assert_eq!(status_of(&resp), 403);

        client.write_all(b"world").unwrap();
        client.shutdown(Shutdown::Write).unwrap();
        let mut resp = String::new();
        client.read_to_string(&mut resp).unwrap();
        worker.join().unwrap();

        assert_eq!(status_of(&resp), 201);
        assert_eq!(std::fs::read(fx.dir.path().join("up.txt")).unwrap(), b"helloworld");
        assert_eq!(staging_files(fx.dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_error_mapping() {
        let os = |e: Errno| io::Error::from_raw_os_error(e as i32);

        assert_eq!(get_open_status(&os(Errno::EACCES)), Status::Forbidden);
        assert_eq!(get_open_status(&os(Errno::EPERM)), Status::Forbidden);
        assert_eq!(get_open_status(&os(Errno::ENOENT)), Status::NotFound);
        assert_eq!(get_open_status(&os(Errno::EIO)), Status::InternalServerError);

        assert_eq!(put_open_status(&os(Errno::EACCES)), Status::Forbidden);
        assert_eq!(put_open_status(&os(Errno::EPERM)), Status::Forbidden);
        assert_eq!(put_open_status(&os(Errno::EISDIR)), Status::Forbidden);
        assert_eq!(put_open_status(&os(Errno::ENOENT)), Status::InternalServerError);
        assert_eq!(put_open_status(&os(Errno::ENOSPC)), Status::InternalServerError);

        assert_eq!(get_open_status(&io::Error::new(io::ErrorKind::Other, "no errno")), Status::InternalServerError);
    }

    #[test]
    fn test_readers_queued_behind_put_see_whole_bodies() {
        let fx = fixture();
        let before = "a".repeat(64 * 1024);
        let after = "b".repeat(32 * 1024);
        std::fs::write(fx.dir.path().join("shared.txt"), &before).unwrap();

        // Stands in for a GET already streaming when the PUT arrives.
        let lock = fx.pipeline.registry().acquire_or_create("shared.txt").unwrap();
        let streaming = lock.read_acquire().unwrap();

        let writer = {
            let p = Arc::clone(&fx.pipeline);
            let raw = format!("PUT /shared.txt HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}", after.len(), after);
            thread::spawn(move || exchange(&p, raw.as_bytes()))
        };
        wait_until("PUT waiting on the write lock", || lock.snapshot().waiting_writers == 1);

        let readers: Vec<_> = (0..10)
            .map(|_| {
                let p = Arc::clone(&fx.pipeline);
                thread::spawn(move || exchange(&p, b"GET /shared.txt HTTP/1.1\r\n\r\n"))
            })
            .collect();
        // One reader fills the batch; the rest queue behind the writer.
        wait_until("readers queued behind the PUT", || lock.snapshot().waiting_readers == 9);
        assert_eq!(std::fs::read_to_string(fx.dir.path().join("shared.txt")).unwrap(), before);

        streaming.release();
        assert_eq!(status_of(&writer.join().unwrap()), 200);

        let mut saw_new = 0;
        for r in readers {
            let resp = r.join().unwrap();
            assert_eq!(status_of(&resp), 200);
            let body = body_of(&resp);
            assert!(body == before || body == after, "mixed body of {} bytes", body.len());
            if body == after {
                saw_new += 1;
            }
        }
        assert!(saw_new >= 9, "queued readers must see the replaced file");
    }
}
