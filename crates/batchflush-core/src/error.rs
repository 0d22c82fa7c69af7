//! Error types for batchflush

/// Result type for batchflush operations
pub type FlushResult<T> = Result<T, FlushError>;

/// Errors that can occur when scheduling flushes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlushError {
    /// The home event loop rejected a submission
    #[error("event loop is shut down")]
    LoopShutdown,

    /// A configuration value is out of range
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// The event loop thread could not be started
    #[error("failed to spawn event loop thread: {0}")]
    SpawnFailed(String),
}

impl From<std::io::Error> for FlushError {
    fn from(e: std::io::Error) -> Self {
        FlushError::SpawnFailed(e.to_string())
    }
}
