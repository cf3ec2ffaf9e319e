//! Relational backend on embedded SQLite.
//!
//! `rusqlite` is synchronous, so every statement runs on the blocking pool
//! against a connection guarded by a mutex. Closing takes the connection out
//! of the mutex; later calls fail with [`BackendError::Closed`].
//!
//! Recognised options:
//! - `busy_timeout_ms` (u64): how long to wait on a locked database, default 5000
//! - `foreign_keys` (bool): enforce foreign keys, default on

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use polydb_core::{
    BackendClient, BackendError, ConnectOptions, Connection, LedgerStore, MigrationRecord,
    RelationalConnection, RelationalModel, SyncOptions, TableDefinition,
};
use rusqlite::{params, ErrorCode};

use crate::error::DriverError;

/// Ledger table name.
const LEDGER_TABLE: &str = "schema_migrations";

/// Target that opens a private in-memory database.
pub const MEMORY_TARGET: &str = ":memory:";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Opens SQLite databases. The connection target is a file path or `:memory:`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClient;

impl SqliteClient {
    /// Create a client.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendClient for SqliteClient {
    type Handle = dyn RelationalConnection;

    async fn open(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn RelationalConnection>, BackendError> {
        let conn = SqliteConnection::open(target, options).await?;
        Ok(Arc::new(conn))
    }
}

/// One SQLite database connection.
pub struct SqliteConnection {
    target: String,
    conn: Arc<Mutex<Option<rusqlite::Connection>>>,
    models: RwLock<BTreeMap<String, RelationalModel>>,
}

impl SqliteConnection {
    /// Open `target` and apply connection pragmas.
    pub async fn open(target: &str, options: &ConnectOptions) -> Result<Self, BackendError> {
        let path = target.to_string();
        let busy_timeout = Duration::from_millis(
            options
                .get_u64("busy_timeout_ms")
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        );
        let foreign_keys = options.get_bool("foreign_keys").unwrap_or(true);

        let conn = tokio::task::spawn_blocking(move || -> Result<_, DriverError> {
            let conn = if path == MEMORY_TARGET {
                rusqlite::Connection::open_in_memory()?
            } else {
                if let Some(parent) = Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                rusqlite::Connection::open(&path)?
            };
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", foreign_keys)?;
            Ok(conn)
        })
        .await
        .map_err(DriverError::from)??;

        tracing::debug!(db = %target, foreign_keys, "opened sqlite database");
        Ok(Self {
            target: target.to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
            models: RwLock::new(BTreeMap::new()),
        })
    }

    fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Run `f` on the blocking pool with exclusive access to the connection.
    async fn run<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, DriverError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            let conn = guard.as_mut().ok_or(DriverError::Closed)?;
            f(conn)
        })
        .await
        .map_err(DriverError::from)?;
        Ok(result?)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn describe(&self) -> String {
        format!("sqlite://{}", self.target)
    }

    async fn probe(&self) -> Result<bool, BackendError> {
        if !self.is_open() {
            return Ok(false);
        }
        self.run(|conn| {
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(one == 1)
        })
        .await
    }

    async fn close(&self) -> Result<(), BackendError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), DriverError> {
            let mut guard = conn.lock();
            let Some(inner) = guard.take() else {
                return Ok(());
            };
            if let Err((inner, e)) = inner.close() {
                *guard = Some(inner);
                return Err(e.into());
            }
            Ok(())
        })
        .await
        .map_err(DriverError::from)??;

        tracing::debug!(db = %self.target, "closed sqlite database");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteConnection {
    async fn ensure_ledger(&self) -> Result<(), BackendError> {
        self.run(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{LEDGER_TABLE}\" (\
                 \"migration_name\" TEXT PRIMARY KEY NOT NULL, \
                 \"applied_at\" TEXT NOT NULL)"
            ))?;
            Ok(())
        })
        .await
    }

    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, BackendError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT migration_name, applied_at FROM \"{LEDGER_TABLE}\" ORDER BY migration_name"
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (migration_name, applied_at) = row?;
                records.push(MigrationRecord {
                    applied_at: parse_timestamp(&applied_at)?,
                    migration_name,
                });
            }
            Ok(records)
        })
        .await
    }

    async fn record_migration(&self, record: &MigrationRecord) -> Result<(), BackendError> {
        let record = record.clone();
        self.run(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO \"{LEDGER_TABLE}\" (migration_name, applied_at) VALUES (?1, ?2)"
                ),
                params![record.migration_name, record.applied_at.to_rfc3339()],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(DriverError::Duplicate(record.migration_name))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

#[async_trait]
impl RelationalConnection for SqliteConnection {
    async fn authenticate(&self) -> Result<(), BackendError> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }

    fn database_name(&self) -> String {
        if self.target == MEMORY_TARGET {
            return "main".to_string();
        }
        Path::new(&self.target)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.target)
            .to_string()
    }

    fn define(
        &self,
        name: &str,
        definition: TableDefinition,
    ) -> Result<RelationalModel, BackendError> {
        definition.validate()?;
        let mut models = self.models.write();
        if models.contains_key(name) {
            return Err(BackendError::DuplicateModel(name.to_string()));
        }
        let model = RelationalModel::new(name, definition);
        models.insert(name.to_string(), model.clone());
        Ok(model)
    }

    fn model(&self, name: &str) -> Option<RelationalModel> {
        self.models.read().get(name).cloned()
    }

    async fn execute(&self, sql: &str) -> Result<(), BackendError> {
        let sql = sql.to_string();
        self.run(move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    async fn table_names(&self) -> Result<Vec<String>, BackendError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn sync(&self, options: &SyncOptions) -> Result<(), BackendError> {
        let definitions: Vec<TableDefinition> = self
            .models
            .read()
            .values()
            .map(|m| m.definition().clone())
            .collect();
        let options = *options;
        let count = definitions.len();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            for definition in &definitions {
                if options.force {
                    tx.execute_batch(&definition.drop_statement())?;
                }
                tx.execute_batch(&definition.create_statement())?;
                if options.alter && !options.force {
                    add_missing_columns(&tx, definition)?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        tracing::debug!(
            db = %self.target,
            tables = count,
            force = options.force,
            alter = options.alter,
            "synchronised sqlite schema"
        );
        Ok(())
    }
}

/// `ALTER TABLE .. ADD COLUMN` for every declared column the table lacks.
fn add_missing_columns(
    conn: &rusqlite::Connection,
    definition: &TableDefinition,
) -> Result<(), DriverError> {
    let existing = existing_columns(conn, &definition.table)?;
    for column in &definition.columns {
        if existing.contains(&column.name) {
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
            definition.table, column.name, column.sql_type
        ))?;
        tracing::debug!(table = %definition.table, column = %column.name, "added column");
    }
    Ok(())
}

fn existing_columns(
    conn: &rusqlite::Connection,
    table: &str,
) -> Result<BTreeSet<String>, DriverError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DriverError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DriverError::InvalidData(format!("applied_at {value:?}: {e}")))
}
