//! Engram error types

use thiserror::Error;

/// Engram error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage medium unreachable or failed. The operation was not applied;
    /// the process is expected to continue.
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// Malformed entity fields, rejected before any write
    #[error("Validation failure: {0}")]
    Validation(String),

    /// A consolidation run failed internally. The batch was discarded, the
    /// watermark is unchanged, and the run is safe to retry.
    #[error("Consolidation aborted: {0}")]
    Consolidation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, Error>;
