//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or running the dispatch loop.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The builder was finished without a transport.
    #[error("No transport configured")]
    MissingTransport,

    /// The runtime has stopped and no longer accepts updates.
    #[error("Runtime is not accepting updates")]
    Closed,

    /// The inbound queue is full.
    #[error("Inbound queue is full")]
    QueueFull,

    /// A lane, source or sweeper task panicked or was aborted.
    #[error("Runtime task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
