//! Request grammar
//!
//! ```text
//! request  = METHOD SP "/" URI SP VERSION CRLF *( header CRLF ) CRLF
//! METHOD   = 1*8 ALPHA
//! URI      = 1*63 ( ALPHA / DIGIT / "." / "-" )
//! VERSION  = "HTTP/" DIGIT "." DIGIT        ; only HTTP/1.1 is served
//! header   = KEY ":" *SP VALUE
//! KEY      = 1*128 ( ALPHA / DIGIT / "." / "-" )
//! VALUE    = 0*128 printable
//! ```
//!
//! The URI is kept without its leading slash. It names a file directly
//! under the document root, so `/` inside it is rejected.

use std::io;

use thiserror::Error;

use crate::limits::{MAX_HEADER_KEY, MAX_HEADER_VALUE, MAX_METHOD, MAX_URI};
use crate::response::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    /// Well-formed but not served
    Other(String),
}

impl Method {
    fn from_token(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Other(m) => m,
        }
    }
}

/// Why a request head was rejected
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("unsupported version {0}")]
    UnsupportedVersion(String),

    #[error("PUT without a valid Content-Length")]
    MissingContentLength,

    #[error("connection closed before the request head completed")]
    Closed,

    #[error("i/o error reading request: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    /// Response sent for this failure
    pub fn response(&self) -> Status {
        match self {
            ParseError::UnsupportedVersion(_) => Status::VersionNotSupported,
            _ => Status::BadRequest,
        }
    }
}

/// A parsed request head
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Resource name without the leading `/`
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Parse a complete head, blank line included
    pub fn parse(head: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(head).map_err(|_| ParseError::Malformed("non-utf8 head"))?;
        let text = text
            .strip_suffix("\r\n\r\n")
            .ok_or(ParseError::Malformed("missing blank line"))?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::Malformed("empty head"))?;
        let (method, uri, version) = parse_request_line(request_line)?;

        let mut headers = Vec::new();
        for line in lines {
            headers.push(parse_header(line)?);
        }

        let req = Request {
            method: Method::from_token(method),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
        };

        if req.method == Method::Put && req.content_length().is_none() {
            return Err(ParseError::MissingContentLength);
        }
        Ok(req)
    }

    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Request-Id` header, or `"0"`
    pub fn request_id(&self) -> &str {
        self.header("Request-Id").unwrap_or("0")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")?.trim().parse().ok()
    }
}

fn parse_request_line(line: &str) -> Result<(&str, &str, &str), ParseError> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::Malformed("request line"));
    };

    if method.is_empty() || method.len() > MAX_METHOD || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ParseError::Malformed("method"));
    }

    let uri = target.strip_prefix('/').ok_or(ParseError::Malformed("uri"))?;
    if uri.is_empty() || uri.len() > MAX_URI || !uri.bytes().all(is_token_byte) {
        return Err(ParseError::Malformed("uri"));
    }

    if !is_well_formed_version(version) {
        return Err(ParseError::Malformed("version"));
    }
    if version != "HTTP/1.1" {
        return Err(ParseError::UnsupportedVersion(version.to_string()));
    }

    Ok((method, uri, version))
}

fn parse_header(line: &str) -> Result<(String, String), ParseError> {
    let (key, value) = line.split_once(':').ok_or(ParseError::Malformed("header"))?;
    let value = value.trim_start_matches(' ');

    if key.is_empty() || key.len() > MAX_HEADER_KEY || !key.bytes().all(is_token_byte) {
        return Err(ParseError::Malformed("header key"));
    }
    if value.len() > MAX_HEADER_VALUE || !value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Err(ParseError::Malformed("header value"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-'
}

fn is_well_formed_version(v: &str) -> bool {
    match v.strip_prefix("HTTP/").map(str::as_bytes) {
        Some([major, b'.', minor]) => major.is_ascii_digit() && minor.is_ascii_digit(),
        _ => false,
    }
}
