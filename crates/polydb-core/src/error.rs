//! Core error types.

use thiserror::Error;

use crate::config::BackendKind;
use crate::migration::MigrationError;

/// Boxed error returned by migration procedures and driver internals.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for orchestration-level operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by a backend client or one of its connections.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The connection has already been closed.
    #[error("connection is closed")]
    Closed,

    /// A model with this name is already registered on the connection.
    #[error("model already registered: {0}")]
    DuplicateModel(String),

    /// A model lookup or association referenced an unknown model.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A migration name is already present in the ledger.
    #[error("migration already recorded: {0}")]
    DuplicateRecord(String),

    /// Invalid input handed to the backend.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure raised by the underlying driver library.
    #[error("{0}")]
    Driver(#[source] BoxError),
}

impl BackendError {
    /// Box a native driver error.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        BackendError::Driver(err.into())
    }
}

/// Orchestration errors.
///
/// Every failure coming out of a backend is tagged with the adapter kind and
/// keeps the original cause as its source.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration. Fatal, raised while building the service.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Opening the connection failed. Retryable by the caller.
    #[error("error connecting to {kind}: {source}")]
    Connection {
        /// Adapter kind.
        kind: BackendKind,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },

    /// Realising models failed. Fatal to that adapter's connect call.
    #[error("error setting up {kind} models: {source}")]
    ModelSetup {
        /// Adapter kind.
        kind: BackendKind,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },

    /// Closing the connection failed.
    #[error("error closing {kind} connection: {source}")]
    Close {
        /// Adapter kind.
        kind: BackendKind,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },

    /// Schema synchronisation failed.
    #[error("error synchronising {kind} schema: {source}")]
    Sync {
        /// Adapter kind.
        kind: BackendKind,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },

    /// A single key-value command failed.
    #[error("{kind} command `{command}` failed: {source}")]
    Command {
        /// Adapter kind.
        kind: BackendKind,
        /// Command and its key, e.g. `get session:1`.
        command: String,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },

    /// The operation needs an open connection.
    #[error("{kind} adapter is not connected")]
    NotConnected {
        /// Adapter kind.
        kind: BackendKind,
    },

    /// Migration engine failure.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl Error {
    /// Adapter kind this error is tagged with, if any.
    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            Error::Connection { kind, .. }
            | Error::ModelSetup { kind, .. }
            | Error::Close { kind, .. }
            | Error::Sync { kind, .. }
            | Error::Command { kind, .. }
            | Error::NotConnected { kind } => Some(*kind),
            Error::Configuration(_) | Error::Migration(_) => None,
        }
    }

    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Command { .. })
    }
}
