//! Status codes and canned responses
//!
//! Every status except a GET 200 goes out as a fixed response whose body
//! is the reason phrase and a newline. A GET 200 uses [`Status::head`] with
//! the file length and the file bytes follow.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    VersionNotSupported,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::VersionNotSupported => 505,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::VersionNotSupported => "Version Not Supported",
        }
    }

    /// Status line and headers for a body of `content_length` bytes
    pub fn head(self, content_length: u64) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Length: {}\r\n\
             \r\n",
            self.code(),
            self.reason(),
            content_length
        )
    }

    /// Complete response with the reason phrase as body
    pub fn canned(self) -> Vec<u8> {
        let body = format!("{}\n", self.reason());
        let mut resp = self.head(body.len() as u64).into_bytes();
        resp.extend_from_slice(body.as_bytes());
        resp
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Status::Ok.code(), 200);
        assert_eq!(Status::Created.code(), 201);
        assert_eq!(Status::NotImplemented.code(), 501);
        assert_eq!(Status::VersionNotSupported.code(), 505);
        assert_eq!(Status::Forbidden.to_string(), "403");
    }

    #[test]
    fn test_canned_not_found() {
        let resp = String::from_utf8(Status::NotFound.canned()).unwrap();
        assert_eq!(
            resp,
            "HTTP/1.1 404 Not Found\r\nContent-Length: 10\r\n\r\nNot Found\n"
        );
    }

    #[test]
    fn test_head_only() {
        assert_eq!(
            Status::Ok.head(5),
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n"
        );
    }
}
