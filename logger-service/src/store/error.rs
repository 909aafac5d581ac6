//! Store error types.

use thiserror::Error;

/// Errors that can occur while establishing or releasing the store connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No server could be selected or reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// The server rejected the configured credentials.
    #[error("store rejected credentials: {0}")]
    Unauthenticated(String),

    /// The operation did not complete within its deadline.
    #[error("store {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: std::time::Duration,
    },

    /// The driver refused the connection options.
    #[error("invalid connection options: {0}")]
    InvalidOptions(String),
}

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed the operation.
    #[error("backend: {0}")]
    Backend(String),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
