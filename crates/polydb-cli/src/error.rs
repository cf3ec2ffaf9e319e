//! CLI error types.

use polydb_core::MigrationError;
use thiserror::Error;

/// Errors that end a CLI run.
#[derive(Debug, Error)]
pub enum CliError {
    /// Service construction, connection or close failure.
    #[error(transparent)]
    Service(#[from] polydb_core::Error),

    /// Fatal migration engine failure.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// `--adapter` names no configured adapter.
    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),

    /// The selected adapter has no migrations directory.
    #[error("adapter {0} has no migrations directory")]
    NoMigrations(String),

    /// No selected adapter has a migrations directory.
    #[error("no adapter has a migrations directory")]
    NothingToMigrate,

    /// Writing output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// JSON rendering failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
