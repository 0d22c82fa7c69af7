//! Event loop configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! ```rust,ignore
//! use batchflush_runtime::LoopConfig;
//!
//! let config = LoopConfig::from_env()
//!     .name("conn-loop")
//!     .park_timeout(Duration::from_millis(10));
//! ```

use batchflush_core::env::{env_get, env_get_str};
use batchflush_core::{FlushError, FlushResult};
use std::time::Duration;

/// Library defaults
pub mod defaults {
    pub const NAME: &str = "batchflush-loop";
    pub const PARK_TIMEOUT_MS: u64 = 100;
    pub const MAX_BATCH: usize = 256;
}

/// Event loop configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// OS thread name prefix
    pub name: String,
    /// Upper bound on one idle park; the loop re-checks its queue after
    pub park_timeout: Duration,
    /// Tasks run back to back before the loop yields its time slice
    pub max_batch: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopConfig {
    /// Library defaults, no env override.
    pub fn new() -> Self {
        Self {
            name: defaults::NAME.to_string(),
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            max_batch: defaults::MAX_BATCH,
        }
    }

    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `BATCHFLUSH_LOOP_NAME` - Thread name prefix
    /// - `BATCHFLUSH_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    /// - `BATCHFLUSH_MAX_BATCH` - Tasks per batch
    pub fn from_env() -> Self {
        Self {
            name: env_get_str("BATCHFLUSH_LOOP_NAME", defaults::NAME),
            park_timeout: Duration::from_millis(env_get(
                "BATCHFLUSH_PARK_TIMEOUT_MS",
                defaults::PARK_TIMEOUT_MS,
            )),
            max_batch: env_get("BATCHFLUSH_MAX_BATCH", defaults::MAX_BATCH),
        }
    }

    // Builder methods

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn max_batch(mut self, n: usize) -> Self {
        self.max_batch = n;
        self
    }

    pub fn validate(&self) -> FlushResult<()> {
        if self.park_timeout.is_zero() {
            return Err(FlushError::InvalidConfig("park_timeout must be > 0"));
        }
        if self.max_batch == 0 {
            return Err(FlushError::InvalidConfig("max_batch must be > 0"));
        }
        Ok(())
    }
}
