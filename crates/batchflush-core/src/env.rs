//! Environment variable utilities
//!
//! Used by the `from_env()` config constructors.
//!
//! ```ignore
//! use batchflush_core::env::env_get;
//!
//! let max_pending: usize = env_get("BATCHFLUSH_MAX_PENDING", 64);
//! ```

use std::str::FromStr;
use tracing::warn;

/// Get environment variable parsed as `T`, or return `default`.
///
/// An unset variable silently yields the default. A set variable that does
/// not parse is reported at `warn` level and also yields the default.
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable environment override");
                default
            }
        },
        Err(_) => default,
    }
}

/// Get environment variable as a string, or return `default`.
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
