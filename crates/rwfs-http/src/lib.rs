//! # rwfs-http
//!
//! The HTTP/1.1 surface the rwfs request pipeline talks to.
//!
//! The pipeline never frames HTTP itself. It gets a parsed [`Request`] from
//! [`Connection::parse`] and answers through exactly one terminal call:
//! [`Connection::send_response`] for a canned status, or
//! [`Connection::send_file`] for a GET body. PUT bodies are drained with
//! [`Connection::recv_file`].
//!
//! ## Modules
//!
//! - `request` - Request grammar and header access
//! - `response` - Status codes and canned responses
//! - `connection` - Socket wrapper: parse, respond, stream bodies
//! - `xfer` - fd-to-fd byte copies (sendfile on Linux)
//! - `error` - Error types

pub mod request;
pub mod response;
pub mod connection;
pub mod xfer;
pub mod error;

pub use request::{Method, ParseError, Request};
pub use response::Status;
pub use connection::Connection;
pub use error::{HttpError, HttpResult};

/// Limits of the accepted request grammar
pub mod limits {
    /// Request line plus headers, including the blank line
    pub const MAX_HEAD: usize = 2048;

    /// Method token length
    pub const MAX_METHOD: usize = 8;

    /// URI length after the leading `/`
    pub const MAX_URI: usize = 63;

    /// Header key and value lengths
    pub const MAX_HEADER_KEY: usize = 128;
    pub const MAX_HEADER_VALUE: usize = 128;
}
