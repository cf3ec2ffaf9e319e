//! Migration-specific error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::{BackendError, BoxError};

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migrations directory could not be created or read.
    #[error("migrations directory {path}: {source}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A migration name contains characters that cannot appear in a file name.
    #[error("invalid migration name {name:?}: use letters, digits, '-' or '_'")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A migration file with the generated name already exists.
    #[error("migration file already exists: {}", path.display())]
    AlreadyExists {
        /// Existing file.
        path: PathBuf,
    },

    /// A migration file has no usable `up`/`down` pair.
    #[error("invalid migration file {file}: {reason}")]
    InvalidFile {
        /// Migration file name.
        file: String,
        /// Why the file was rejected.
        reason: String,
    },

    /// `up` failed; `down` ran and succeeded.
    #[error("migration {file} failed: {source}")]
    Apply {
        /// Migration file name.
        file: String,
        /// Error raised by `up` or by the ledger write.
        #[source]
        source: BoxError,
    },

    /// `up` failed and the compensating `down` failed too.
    #[error("migration {file} left in an undefined state: up failed ({up}), down failed ({down})")]
    UndefinedState {
        /// Migration file name.
        file: String,
        /// Error raised by `up`.
        up: BoxError,
        /// Error raised by `down`.
        down: BoxError,
    },

    /// Reading or writing the ledger failed.
    #[error("migration ledger error: {0}")]
    Ledger(#[source] BackendError),

    /// The engine could not verify its connection.
    #[error("migration engine cannot reach the database: {0}")]
    Connect(#[source] BackendError),

    /// I/O failure on a migration file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Migration file this error relates to, if any.
    pub fn file(&self) -> Option<&str> {
        match self {
            MigrationError::InvalidFile { file, .. }
            | MigrationError::Apply { file, .. }
            | MigrationError::UndefinedState { file, .. } => Some(file),
            _ => None,
        }
    }
}
