//! PolyDB operational command.
//!
//! The `polydb` binary reads a JSON manifest, builds the service on the
//! built-in drivers and runs one subcommand. Migration procedures are
//! compiled Rust, so an application that ships its own migrations builds
//! its own binary around [`main_with`] and registers them there:
//!
//! ```no_run
//! use clap::Parser;
//! use polydb_cli::{main_with, Cli};
//! use polydb_core::MigrationRegistry;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     polydb_cli::init_tracing();
//!     main_with(Cli::parse(), |config| {
//!         config.register_relational_migrations("main", MigrationRegistry::new())
//!     })
//!     .await
//! }
//! ```

pub mod commands;
pub mod error;
pub mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use polydb_core::{DbService, ServiceConfig, ServiceManifest};
use tracing_subscriber::EnvFilter;

pub use commands::execute;
pub use error::CliError;
pub use output::OutputFormat;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "polydb=info";

/// PolyDB migration and health tool
#[derive(Parser, Debug)]
#[command(name = "polydb")]
#[command(version, about = "PolyDB migration and health tool")]
pub struct Cli {
    /// Service manifest
    #[arg(short, long, default_value = "polydb.json")]
    pub config: PathBuf,

    /// Only act on this adapter
    #[arg(short, long)]
    pub adapter: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the migrations directory and seed a first migration
    Init,
    /// Write a new timestamped migration skeleton
    Generate {
        /// Migration name ([A-Za-z0-9_-])
        name: String,
    },
    /// Apply pending migrations
    Migrate,
    /// List migration files and whether they are applied
    Status,
    /// Report adapter liveness
    Health,
}

/// Install the `tracing` subscriber. Honours `RUST_LOG`.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    // Already installed by the host application.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the manifest at `path` against the built-in drivers.
pub fn load_config(path: &Path) -> Result<ServiceConfig, CliError> {
    let manifest = ServiceManifest::from_path(path)?;
    Ok(manifest.to_config(&polydb_drivers::builtin())?)
}

/// Load the manifest, let `configure` adjust it, run the command and close
/// every connection. Exit code 1 on error or when the command reported a
/// failure.
pub async fn main_with<F>(cli: Cli, configure: F) -> ExitCode
where
    F: FnOnce(&mut ServiceConfig) -> polydb_core::Result<()>,
{
    match run(&cli, configure).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run<F>(cli: &Cli, configure: F) -> Result<bool, CliError>
where
    F: FnOnce(&mut ServiceConfig) -> polydb_core::Result<()>,
{
    let mut config = load_config(&cli.config)?;
    configure(&mut config)?;
    let service = DbService::new(config)?;

    let mut stdout = std::io::stdout();
    let result = execute(cli, &service, &mut stdout).await;

    if let Err(e) = service.close_connection().await {
        tracing::warn!(error = %e, "failed to close connections");
    }
    result
}
