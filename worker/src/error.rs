//! Unified error handling for the worker.

use crate::config::ConfigError;

/// Worker error type.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Engine error: {0}")]
    Engine(#[from] tidy_engine::Error),

    #[error("Snapshot file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
