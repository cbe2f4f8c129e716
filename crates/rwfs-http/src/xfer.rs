//! Byte copies between descriptors

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::error::{HttpError, HttpResult};

/// Copy exactly `len` bytes from `src` to `dst`
///
/// Fails with [`HttpError::ShortBody`] if `src` ends early.
pub fn copy_exact<R, W>(src: &mut R, dst: &mut W, len: u64) -> HttpResult<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let received = io::copy(&mut src.take(len), dst)?;
    if received < len {
        return Err(HttpError::ShortBody { expected: len, received });
    }
    Ok(received)
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        use nix::errno::Errno;
        use nix::sys::sendfile::sendfile;

        /// Largest count handed to one sendfile(2) call
        const SENDFILE_CHUNK: u64 = 1 << 30;

        /// Stream `len` bytes of `file`, from its current offset, to `out`
        pub fn send_file_body(out: &TcpStream, file: &File, len: u64) -> HttpResult<u64> {
            let mut sent = 0u64;
            while sent < len {
                let count = (len - sent).min(SENDFILE_CHUNK) as usize;
                match sendfile(out, file, None, count) {
                    Ok(0) => return Err(HttpError::ShortFile { expected: len, sent }),
                    Ok(n) => sent += n as u64,
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(io::Error::from(e).into()),
                }
            }
            Ok(sent)
        }
    } else {
        /// Stream `len` bytes of `file`, from its current offset, to `out`
        pub fn send_file_body(out: &TcpStream, file: &File, len: u64) -> HttpResult<u64> {
            let mut out = out;
            let sent = io::copy(&mut file.take(len), &mut out)?;
            if sent < len {
                return Err(HttpError::ShortFile { expected: len, sent });
            }
            Ok(sent)
        }
    }
}
