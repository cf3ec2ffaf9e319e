//! Driver error types.

use polydb_core::BackendError;
use thiserror::Error;

/// Errors raised inside the embedded drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Document (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,

    /// A ledger entry with this name already exists.
    #[error("migration already recorded: {0}")]
    Duplicate(String),

    /// Invalid input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored data could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<DriverError> for BackendError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Closed => BackendError::Closed,
            DriverError::Duplicate(name) => BackendError::DuplicateRecord(name),
            DriverError::InvalidArgument(msg) => BackendError::InvalidArgument(msg),
            other => BackendError::driver(other),
        }
    }
}
