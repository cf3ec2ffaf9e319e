//! Output rendering for command results.

use std::collections::BTreeMap;
use std::path::Path;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use polydb_core::migration::MigrationStatusEntry;
use polydb_core::MigrationReport;
use serde_json::json;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    #[default]
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Per-adapter liveness.
pub fn health(format: OutputFormat, health: &BTreeMap<String, bool>) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec![Cell::new("adapter"), Cell::new("connected")]);
            for (name, alive) in health {
                table.add_row(vec![Cell::new(name), Cell::new(if *alive { "yes" } else { "no" })]);
            }
            table.to_string()
        }
        OutputFormat::Json => json!(health).to_string(),
    }
}

/// Migration file listing, one block per adapter.
pub fn status(format: OutputFormat, status: &BTreeMap<String, Vec<MigrationStatusEntry>>) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec![
                Cell::new("adapter"),
                Cell::new("migration"),
                Cell::new("applied at"),
                Cell::new("registered"),
            ]);
            let mut rows = 0;
            for (name, entries) in status {
                for entry in entries {
                    let applied = entry
                        .applied_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "pending".to_string());
                    table.add_row(vec![
                        Cell::new(name),
                        Cell::new(&entry.file),
                        Cell::new(applied),
                        Cell::new(if entry.registered { "yes" } else { "no" }),
                    ]);
                    rows += 1;
                }
            }
            format!("{table}\n{rows} migration(s)")
        }
        OutputFormat::Json => {
            let value: BTreeMap<_, Vec<_>> = status
                .iter()
                .map(|(name, entries)| {
                    let entries = entries
                        .iter()
                        .map(|e| {
                            json!({
                                "file": e.file,
                                "appliedAt": e.applied_at,
                                "registered": e.registered,
                            })
                        })
                        .collect();
                    (name, entries)
                })
                .collect();
            json!(value).to_string()
        }
    }
}

/// Result of a `migrate` run.
pub fn reports(format: OutputFormat, reports: &BTreeMap<String, MigrationReport>) -> String {
    match format {
        OutputFormat::Table => {
            let mut lines = Vec::new();
            for (name, report) in reports {
                if report.attempted() == 0 {
                    lines.push(format!("{name}: up to date"));
                    continue;
                }
                lines.push(format!(
                    "{name}: {} applied, {} invalid, {} failed",
                    report.applied.len(),
                    report.invalid.len(),
                    report.failed.len()
                ));
                for file in &report.applied {
                    lines.push(format!("  applied  {file}"));
                }
                for err in report.invalid.iter().chain(&report.failed) {
                    lines.push(format!("  error    {err}"));
                }
            }
            lines.join("\n")
        }
        OutputFormat::Json => {
            let value: BTreeMap<_, _> = reports
                .iter()
                .map(|(name, report)| {
                    let errors = |list: &[polydb_core::MigrationError]| {
                        list.iter().map(|e| e.to_string()).collect::<Vec<_>>()
                    };
                    let entry = json!({
                        "applied": report.applied,
                        "invalid": errors(&report.invalid),
                        "failed": errors(&report.failed),
                    });
                    (name, entry)
                })
                .collect();
            json!(value).to_string()
        }
    }
}

/// Files written by `init` or `generate`.
pub fn files(format: OutputFormat, files: &BTreeMap<String, Option<&Path>>) -> String {
    match format {
        OutputFormat::Table => files
            .iter()
            .map(|(name, path)| match path {
                Some(path) => format!("{name}: created {}", path.display()),
                None => format!("{name}: already initialised"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => {
            let value: BTreeMap<_, _> = files
                .iter()
                .map(|(name, path)| (name, path.map(|p| p.display().to_string())))
                .collect();
            json!(value).to_string()
        }
    }
}
