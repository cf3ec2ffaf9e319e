//! Migration engine: generates, discovers and applies migration files.
//!
//! One engine is bound to one adapter's live connection. Application within
//! an engine is strictly sequential; engines of different adapters run
//! independently.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use super::error::MigrationError;
use super::ledger::{applied_names, MigrationRecord};
use super::naming::{self, DEFAULT_EXTENSION, SEED_MIGRATION};
use super::registry::MigrationRegistry;
use super::target::MigrationTarget;
use crate::error::BoxError;
use crate::logger::SharedLogger;

const SKELETON: &str = r#"//! Migration __NAME__.

use std::sync::Arc;

use polydb::migration::Migration;
use polydb::{BoxError, __CONNECTION__};

/// Register under "__STEM__".
pub fn migration() -> Migration<dyn __CONNECTION__> {
    Migration::new()
        .up(|_db: Arc<dyn __CONNECTION__>| async move { Ok::<(), BoxError>(()) })
        .down(|_db: Arc<dyn __CONNECTION__>| async move { Ok::<(), BoxError>(()) })
}
"#;

/// Where migration files live and which procedures back them.
pub struct MigrationSettings<C: ?Sized> {
    /// Migrations directory.
    pub directory: PathBuf,
    /// Extension of migration files, without the dot.
    pub extension: String,
    /// Procedures keyed by file stem.
    pub registry: Arc<MigrationRegistry<C>>,
}

impl<C: ?Sized> MigrationSettings<C> {
    /// Settings for `directory` with the default extension and no registrations.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            registry: Arc::new(MigrationRegistry::new()),
        }
    }

    /// Use a different file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Use `registry` to resolve migration files.
    pub fn with_registry(mut self, registry: MigrationRegistry<C>) -> Self {
        self.registry = Arc::new(registry);
        self
    }
}

impl<C: ?Sized> Clone for MigrationSettings<C> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            extension: self.extension.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<C: ?Sized> fmt::Debug for MigrationSettings<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSettings")
            .field("directory", &self.directory)
            .field("extension", &self.extension)
            .field("registered", &self.registry.len())
            .finish()
    }
}

/// Engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// Ledger not yet verified.
    Uninitialized,
    /// Connection verified and ledger present.
    Connected,
    /// Listing migration files.
    Scanning,
    /// Running one migration file.
    Applying {
        /// File being applied.
        file: String,
    },
    /// A `migrate` call finished.
    Idle,
}

/// Outcome of one [`MigrationEngine::migrate`] call.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Files applied and recorded, in order.
    pub applied: Vec<String>,
    /// Files skipped because no complete `up`/`down` pair is registered.
    pub invalid: Vec<MigrationError>,
    /// Files whose `up` failed. Never recorded in the ledger.
    pub failed: Vec<MigrationError>,
}

impl MigrationReport {
    /// Whether every pending file was applied.
    pub fn is_success(&self) -> bool {
        self.invalid.is_empty() && self.failed.is_empty()
    }

    /// Number of files the call looked at.
    pub fn attempted(&self) -> usize {
        self.applied.len() + self.invalid.len() + self.failed.len()
    }
}

/// One line of [`MigrationEngine::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatusEntry {
    /// Migration file name.
    pub file: String,
    /// When it was recorded, if applied.
    pub applied_at: Option<DateTime<Utc>>,
    /// Whether a complete `up`/`down` pair is registered for it.
    pub registered: bool,
}

impl MigrationStatusEntry {
    /// Whether the file is recorded in the ledger.
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Applies migration files against one connection.
pub struct MigrationEngine<C: ?Sized + MigrationTarget> {
    adapter: String,
    connection: Arc<C>,
    settings: MigrationSettings<C>,
    logger: SharedLogger,
    state: Mutex<EngineState>,
    run_lock: tokio::sync::Mutex<()>,
}

impl<C: ?Sized + MigrationTarget> MigrationEngine<C> {
    /// Bind an engine to `connection`.
    pub fn new(
        adapter: impl Into<String>,
        connection: Arc<C>,
        settings: MigrationSettings<C>,
        logger: SharedLogger,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            connection,
            settings,
            logger,
            state: Mutex::new(EngineState::Uninitialized),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Adapter this engine belongs to.
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// Bound connection.
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Migrations directory.
    pub fn directory(&self) -> &Path {
        &self.settings.directory
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    /// Verify the connection and create the ledger if absent. Idempotent.
    pub async fn connect(&self) -> Result<(), MigrationError> {
        self.connection
            .verify()
            .await
            .map_err(MigrationError::Connect)?;
        self.connection
            .ensure_ledger()
            .await
            .map_err(MigrationError::Ledger)?;

        let mut state = self.state.lock();
        if *state == EngineState::Uninitialized {
            *state = EngineState::Connected;
            tracing::debug!(adapter = %self.adapter, kind = %C::KIND, "migration engine connected");
        }
        Ok(())
    }

    /// Ensure the migrations directory exists, seeding a "first" migration
    /// when it holds no migration files. Returns the seeded file, if any.
    pub async fn init(&self) -> Result<Option<PathBuf>, MigrationError> {
        let directory = self.directory();
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|source| MigrationError::Directory {
                path: directory.to_path_buf(),
                source,
            })?;

        if !self.migration_files().await?.is_empty() {
            tracing::debug!(adapter = %self.adapter, dir = %directory.display(), "migrations directory already initialised");
            return Ok(None);
        }

        let seeded = self.generate_migration(SEED_MIGRATION).await?;
        Ok(Some(seeded))
    }

    /// Write a skeleton migration named after the current UTC time.
    pub async fn generate_migration(&self, name: &str) -> Result<PathBuf, MigrationError> {
        self.generate_migration_at(name, Utc::now()).await
    }

    /// Write a skeleton migration timestamped `at`. Never overwrites.
    pub async fn generate_migration_at(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, MigrationError> {
        naming::validate_name(name)?;

        let directory = self.directory();
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|source| MigrationError::Directory {
                path: directory.to_path_buf(),
                source,
            })?;

        let stem = naming::migration_stem(at, name);
        let path = directory.join(format!("{stem}.{}", self.settings.extension));
        let contents = SKELETON
            .replace("__NAME__", name)
            .replace("__STEM__", &stem)
            .replace("__CONNECTION__", C::CONNECTION_TYPE);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MigrationError::AlreadyExists { path });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;

        self.logger
            .log(&format!("Generated migration {}", path.display()));
        Ok(path)
    }

    /// Apply every migration file not yet in the ledger, in file name order.
    ///
    /// A file that cannot be resolved or whose `up` fails is reported and
    /// skipped; the batch always runs to the end. Only connection, ledger
    /// read and directory failures abort the call.
    pub async fn migrate(&self) -> Result<MigrationReport, MigrationError> {
        let _guard = self.run_lock.lock().await;

        let result = self.run_pending().await;
        self.set_state(EngineState::Idle);
        result
    }

    async fn run_pending(&self) -> Result<MigrationReport, MigrationError> {
        self.connect().await?;

        let records = self
            .connection
            .applied_migrations()
            .await
            .map_err(MigrationError::Ledger)?;
        let applied = applied_names(&records);

        self.set_state(EngineState::Scanning);
        let files = self.migration_files().await?;
        let pending: Vec<String> = files
            .into_iter()
            .filter(|file| !applied.contains(file))
            .collect();

        tracing::debug!(
            adapter = %self.adapter,
            kind = %C::KIND,
            applied = applied.len(),
            pending = pending.len(),
            "scanned migrations"
        );

        let mut report = MigrationReport::default();
        for file in pending {
            self.set_state(EngineState::Applying { file: file.clone() });

            let migration = naming::file_stem(&file, &self.settings.extension)
                .and_then(|stem| self.settings.registry.get(stem));
            let (up, down) = match migration.and_then(|m| Some((m.up_fn()?, m.down_fn()?))) {
                Some(pair) => pair,
                None => {
                    let reason = match migration {
                        None => "no migration registered for this file",
                        Some(_) => "migration must define both up and down",
                    };
                    self.logger
                        .error(&format!("Invalid migration file {file}: {reason}"));
                    report.invalid.push(MigrationError::InvalidFile {
                        file,
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            let outcome = match up(Arc::clone(&self.connection)).await {
                Ok(()) => self
                    .connection
                    .record_migration(&MigrationRecord::now(&file))
                    .await
                    .map_err(BoxError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    self.logger
                        .log(&format!("Migration {file} applied successfully"));
                    report.applied.push(file);
                }
                Err(up_error) => {
                    self.logger
                        .error(&format!("Error applying migration {file}: {up_error}"));
                    let failure = match down(Arc::clone(&self.connection)).await {
                        Ok(()) => {
                            self.logger.log(&format!("Migration {file} rolled back"));
                            MigrationError::Apply {
                                file,
                                source: up_error,
                            }
                        }
                        Err(down_error) => {
                            self.logger.error(&format!(
                                "Rollback of migration {file} failed: {down_error}"
                            ));
                            MigrationError::UndefinedState {
                                file,
                                up: up_error,
                                down: down_error,
                            }
                        }
                    };
                    report.failed.push(failure);
                }
            }
        }

        Ok(report)
    }

    /// Every migration file with its ledger state.
    pub async fn status(&self) -> Result<Vec<MigrationStatusEntry>, MigrationError> {
        self.connect().await?;

        let records = self
            .connection
            .applied_migrations()
            .await
            .map_err(MigrationError::Ledger)?;
        let applied: BTreeMap<String, DateTime<Utc>> = records
            .into_iter()
            .map(|r| (r.migration_name, r.applied_at))
            .collect();

        let entries = self
            .migration_files()
            .await?
            .into_iter()
            .map(|file| {
                let registered = naming::file_stem(&file, &self.settings.extension)
                    .and_then(|stem| self.settings.registry.get(stem))
                    .is_some_and(|m| m.is_complete());
                MigrationStatusEntry {
                    applied_at: applied.get(&file).copied(),
                    registered,
                    file,
                }
            })
            .collect();
        Ok(entries)
    }

    /// Migration file names in the directory, sorted.
    pub async fn migration_files(&self) -> Result<Vec<String>, MigrationError> {
        let directory = self.directory();
        let dir_error = |source| MigrationError::Directory {
            path: directory.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(directory).await.map_err(dir_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
            if !entry.file_type().await.map_err(dir_error)?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if naming::file_stem(&name, &self.settings.extension).is_some() {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl<C: ?Sized + MigrationTarget> fmt::Debug for MigrationEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("adapter", &self.adapter)
            .field("kind", &C::KIND)
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}
