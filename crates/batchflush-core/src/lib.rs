//! # batchflush-core
//!
//! Core types and traits for the batchflush write-coalescing flusher.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The reference event loop lives in `batchflush-runtime`; the flush
//! coordinator itself lives in `batchflush`.
//!
//! ## Modules
//!
//! - `traits` - Channel and event loop capabilities consumed by the flusher
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod traits;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use traits::{Channel, EventLoop, Task};
pub use error::{FlushError, FlushResult};
pub use env::{env_get, env_get_str};

/// Shared constants
pub mod constants {
    /// Default number of on-loop flush requests before an in-line flush
    pub const DEFAULT_MAX_PENDING: usize = 64;

    /// Env var overriding the flusher's `max_pending`
    pub const ENV_MAX_PENDING: &str = "BATCHFLUSH_MAX_PENDING";
}
