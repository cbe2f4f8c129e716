//! One accepted client socket
//!
//! A connection serves a single request and is closed when dropped.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

use tracing::trace;

use crate::error::HttpResult;
use crate::limits::MAX_HEAD;
use crate::request::{ParseError, Request};
use crate::response::Status;
use crate::xfer;

const HEAD_END: &[u8] = b"\r\n\r\n";

pub struct Connection {
    /// Body bytes read past the head stay buffered here for `recv_file`
    reader: BufReader<TcpStream>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self { reader: BufReader::new(stream) }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.reader.get_ref().peer_addr()
    }

    /// Read and parse the request head
    pub fn parse(&mut self) -> Result<Request, ParseError> {
        let head = self.read_head()?;
        trace!(bytes = head.len(), "request head");
        Request::parse(&head)
    }

    fn read_head(&mut self) -> Result<Vec<u8>, ParseError> {
        let mut head = Vec::with_capacity(256);
        while !head.ends_with(HEAD_END) {
            if head.len() >= MAX_HEAD {
                return Err(ParseError::HeadTooLarge(MAX_HEAD));
            }
            let budget = (MAX_HEAD - head.len()) as u64;
            let n = (&mut self.reader).take(budget).read_until(b'\n', &mut head)?;
            if n == 0 {
                return Err(ParseError::Closed);
            }
        }
        Ok(head)
    }

    /// Send a canned response
    pub fn send_response(&mut self, status: Status) -> HttpResult<()> {
        self.reader.get_mut().write_all(&status.canned())?;
        Ok(())
    }

    /// Send a 200 whose body is the first `len` bytes of `file`
    pub fn send_file(&mut self, file: &File, len: u64) -> HttpResult<()> {
        let stream = self.reader.get_mut();
        stream.write_all(Status::Ok.head(len).as_bytes())?;
        xfer::send_file_body(stream, file, len)?;
        Ok(())
    }

    /// Drain exactly `len` body bytes into `dst`
    pub fn recv_file<W: Write + ?Sized>(&mut self, dst: &mut W, len: u64) -> HttpResult<u64> {
        xfer::copy_exact(&mut self.reader, dst, len)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer_addr().ok())
            .finish()
    }
}
