//! Environment variable utilities
//!
//! Every tunable in rwfs has a compiled-in default that an `RWFS_*`
//! variable can override. A value that is set but does not parse is
//! reported once through `tracing` and the default is used instead.
//!
//! ```ignore
//! use rwfs_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("RWFS_WORKERS", 4);
//! let flush = env_get_bool("RWFS_FLUSH_AUDIT", true);
//! ```

use std::str::FromStr;

use tracing::warn;

/// Parse `key` as `T`, falling back to `default` when unset or malformed
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` if it is set and well-formed
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed environment override");
            None
        }
    }
}

/// Read `key` as a flag
///
/// `1/true/yes/on` and `0/false/no/off` are recognized (any case);
/// anything else keeps `default`.
pub fn env_get_bool(key: &str, default: bool) -> bool {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(key, value = %raw, "ignoring malformed boolean override");
            default
        }
    }
}

/// Read `key` verbatim, or `default` when unset
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
