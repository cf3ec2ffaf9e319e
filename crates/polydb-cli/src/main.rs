//! PolyDB command-line tool.

use std::process::ExitCode;

use clap::Parser;
use polydb_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    polydb_cli::init_tracing();
    polydb_cli::main_with(Cli::parse(), |_| Ok(())).await
}
