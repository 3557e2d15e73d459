//! Common error types for the paper list tooling

use thiserror::Error;

/// Common result type for paper list operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the library and the `apl` binary
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be read or written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Spreadsheet (CSV) store could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema registry definition violates its invariants
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisted canonical set is inconsistent (e.g. orphan conflict shadow)
    #[error("Corrupted canonical state: {0}")]
    CorruptState(String),

    /// Store could not persist the canonical set
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
