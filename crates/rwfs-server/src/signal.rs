//! Process signal setup

use crate::error::ServerResult;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use nix::sys::signal::{signal, SigHandler, Signal};

        use crate::error::ServerError;

        /// Ignore SIGPIPE so a client hanging up mid-write only fails that write
        pub fn ignore_sigpipe() -> ServerResult<()> {
            // SAFETY: SIG_IGN installs no handler code.
            unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }
                .map_err(|e| ServerError::Signal(e.into()))?;
            Ok(())
        }
    } else {
        pub fn ignore_sigpipe() -> ServerResult<()> {
            Ok(())
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_sigpipe_is_repeatable() {
        ignore_sigpipe().unwrap();
        ignore_sigpipe().unwrap();
    }
}
