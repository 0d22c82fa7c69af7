//! Flusher configuration
//!
//! `FlusherConfig::default()` is the library default (`max_pending = 64`).
//! `from_env()` applies `BATCHFLUSH_MAX_PENDING` on top.

use batchflush_core::constants::{DEFAULT_MAX_PENDING, ENV_MAX_PENDING};
use batchflush_core::env::env_get;
use batchflush_core::{FlushError, FlushResult};

/// Flush coordinator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlusherConfig {
    /// On-loop requests that force an in-line flush
    pub max_pending: usize,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FlusherConfig {
    pub fn new() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Library defaults with environment overrides.
    ///
    /// - `BATCHFLUSH_MAX_PENDING` - in-line flush threshold
    pub fn from_env() -> Self {
        Self {
            max_pending: env_get(ENV_MAX_PENDING, DEFAULT_MAX_PENDING),
        }
    }

    pub fn max_pending(mut self, n: usize) -> Self {
        self.max_pending = n;
        self
    }

    pub fn validate(&self) -> FlushResult<()> {
        if self.max_pending == 0 {
            return Err(FlushError::InvalidConfig("max_pending must be > 0"));
        }
        Ok(())
    }
}
