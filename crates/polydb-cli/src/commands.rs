//! Subcommand execution.

use std::collections::BTreeMap;
use std::io::Write;

use polydb_core::{Adapter, AdapterMigrations, DbService};

use crate::error::CliError;
use crate::output;
use crate::{Cli, Command};

/// Run `cli.command` against `service`, writing results to `out`.
///
/// Connects the selected adapters first. Returns `Ok(false)` when the command
/// ran but reported a failure: a migration failed, a file was invalid, or an
/// adapter is down.
pub async fn execute<W: Write>(
    cli: &Cli,
    service: &DbService,
    out: &mut W,
) -> Result<bool, CliError> {
    let names = selected(cli, service)?;

    for name in &names {
        let Some(adapter) = service.adapter(name) else {
            continue;
        };
        if let Err(e) = adapter.as_adapter().connect().await {
            // Health reports the adapter as down instead.
            if cli.command != Command::Health {
                return Err(e.into());
            }
            tracing::warn!(adapter = %name, error = %e, "connect failed");
        }
    }

    let format = cli.format;
    let success = match &cli.command {
        Command::Health => {
            let mut health = BTreeMap::new();
            for name in &names {
                if let Some(adapter) = service.adapter(name) {
                    health.insert(name.clone(), adapter.as_adapter().is_connected().await);
                }
            }
            writeln!(out, "{}", output::health(format, &health))?;
            health.values().all(|alive| *alive)
        }
        Command::Init => {
            let engines = engines(cli, service, &names)?;
            let mut seeded = BTreeMap::new();
            for (name, engine) in &engines {
                seeded.insert(name.clone(), engine.init().await?);
            }
            let files = seeded
                .iter()
                .map(|(name, path)| (name.clone(), path.as_deref()))
                .collect();
            writeln!(out, "{}", output::files(format, &files))?;
            true
        }
        Command::Generate { name: migration } => {
            let engines = engines(cli, service, &names)?;
            let mut generated = BTreeMap::new();
            for (name, engine) in &engines {
                generated.insert(name.clone(), engine.generate_migration(migration).await?);
            }
            let files = generated
                .iter()
                .map(|(name, path)| (name.clone(), Some(path.as_path())))
                .collect();
            writeln!(out, "{}", output::files(format, &files))?;
            true
        }
        Command::Migrate => {
            let engines = engines(cli, service, &names)?;
            let mut reports = BTreeMap::new();
            for (name, engine) in &engines {
                reports.insert(name.clone(), engine.migrate().await?);
            }
            writeln!(out, "{}", output::reports(format, &reports))?;
            reports.values().all(|r| r.is_success())
        }
        Command::Status => {
            let engines = engines(cli, service, &names)?;
            let mut status = BTreeMap::new();
            for (name, engine) in &engines {
                status.insert(name.clone(), engine.status().await?);
            }
            writeln!(out, "{}", output::status(format, &status))?;
            true
        }
    };

    Ok(success)
}

/// Adapter names the command applies to.
fn selected(cli: &Cli, service: &DbService) -> Result<Vec<String>, CliError> {
    match &cli.adapter {
        Some(name) if service.adapter(name).is_none() => {
            Err(CliError::UnknownAdapter(name.clone()))
        }
        Some(name) => Ok(vec![name.clone()]),
        None => Ok(service.names().map(str::to_string).collect()),
    }
}

/// Migration engines of the selected (and already connected) adapters.
fn engines(
    cli: &Cli,
    service: &DbService,
    names: &[String],
) -> Result<BTreeMap<String, AdapterMigrations>, CliError> {
    let mut engines = BTreeMap::new();
    for name in names {
        let Some(adapter) = service.adapter(name) else {
            continue;
        };
        match adapter.migrations() {
            Some(engine) => {
                engines.insert(name.clone(), engine);
            }
            None if cli.adapter.is_some() => return Err(CliError::NoMigrations(name.clone())),
            None => {}
        }
    }

    if engines.is_empty() {
        return Err(CliError::NothingToMigrate);
    }
    Ok(engines)
}
