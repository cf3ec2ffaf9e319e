//! Adapters: one per backend kind, all behind the [`Adapter`] contract.
//!
//! An adapter owns at most one open connection. `connect` is idempotent,
//! realises the configured models on the new connection and attaches a
//! migration engine when a migrations directory is configured.

pub mod document;
pub mod key_value;
pub mod models;
pub mod relational;
mod slot;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{DocumentConnection, RelationalConnection, SyncOptions};
use crate::config::{AdapterConfig, BackendKind};
use crate::error::Result;
use crate::migration::{MigrationEngine, MigrationError, MigrationReport, MigrationStatusEntry};

pub use document::DocumentAdapter;
pub use key_value::KeyValueAdapter;
pub use models::{AssociateHook, ModelDefinition, ModelFactory, ModelRegistry};
pub use relational::RelationalAdapter;

/// Lifecycle contract shared by every adapter.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Backend kind.
    fn kind(&self) -> BackendKind;

    /// Logical name from the configuration.
    fn name(&self) -> &str;

    /// Open the connection and realise models. No-op when already connected.
    async fn connect(&self) -> Result<()>;

    /// Whether the connection is usable. Probe failures count as `false`.
    async fn is_connected(&self) -> bool;

    /// Close the connection.
    async fn close_connection(&self) -> Result<()>;

    /// Realise the configured models on the open connection.
    async fn setup_models(&self) -> Result<()>;

    /// Schema synchronisation, for adapters that support it.
    fn as_schema_sync(&self) -> Option<&dyn SchemaSync> {
        None
    }
}

/// Optional schema synchronisation capability.
#[async_trait]
pub trait SchemaSync: Send + Sync {
    /// Apply model definitions directly to the live connection.
    async fn sync_db(&self, options: &SyncOptions) -> Result<()>;
}

/// The closed set of adapter variants.
pub enum AdapterInstance {
    /// Document adapter.
    Document(DocumentAdapter),
    /// Relational adapter.
    Relational(RelationalAdapter),
    /// Key-value adapter.
    KeyValue(KeyValueAdapter),
}

impl AdapterInstance {
    /// Build the adapter variant matching `config`.
    pub fn from_config(name: impl Into<String>, config: AdapterConfig) -> Self {
        let name = name.into();
        match config {
            AdapterConfig::Document(c) => AdapterInstance::Document(DocumentAdapter::new(name, c)),
            AdapterConfig::Relational(c) => {
                AdapterInstance::Relational(RelationalAdapter::new(name, c))
            }
            AdapterConfig::KeyValue(c) => AdapterInstance::KeyValue(KeyValueAdapter::new(name, c)),
        }
    }

    /// The adapter behind the common contract.
    pub fn as_adapter(&self) -> &dyn Adapter {
        match self {
            AdapterInstance::Document(a) => a,
            AdapterInstance::Relational(a) => a,
            AdapterInstance::KeyValue(a) => a,
        }
    }

    /// Attached migration engine, if the adapter is connected and has a
    /// migrations directory.
    pub fn migrations(&self) -> Option<AdapterMigrations> {
        match self {
            AdapterInstance::Document(a) => a.migrations().map(AdapterMigrations::Document),
            AdapterInstance::Relational(a) => a.migrations().map(AdapterMigrations::Relational),
            AdapterInstance::KeyValue(_) => None,
        }
    }

    /// Whether a migrations directory is configured.
    pub fn has_migrations(&self) -> bool {
        match self {
            AdapterInstance::Document(a) => a.migrations_directory().is_some(),
            AdapterInstance::Relational(a) => a.migrations_directory().is_some(),
            AdapterInstance::KeyValue(_) => false,
        }
    }
}

/// A migration engine of either migratable kind.
#[derive(Clone)]
pub enum AdapterMigrations {
    /// Engine bound to a document connection.
    Document(Arc<MigrationEngine<dyn DocumentConnection>>),
    /// Engine bound to a relational connection.
    Relational(Arc<MigrationEngine<dyn RelationalConnection>>),
}

impl AdapterMigrations {
    /// Migrations directory.
    pub fn directory(&self) -> &Path {
        match self {
            AdapterMigrations::Document(e) => e.directory(),
            AdapterMigrations::Relational(e) => e.directory(),
        }
    }

    /// See [`MigrationEngine::init`].
    pub async fn init(&self) -> std::result::Result<Option<PathBuf>, MigrationError> {
        match self {
            AdapterMigrations::Document(e) => e.init().await,
            AdapterMigrations::Relational(e) => e.init().await,
        }
    }

    /// See [`MigrationEngine::generate_migration`].
    pub async fn generate_migration(
        &self,
        name: &str,
    ) -> std::result::Result<PathBuf, MigrationError> {
        match self {
            AdapterMigrations::Document(e) => e.generate_migration(name).await,
            AdapterMigrations::Relational(e) => e.generate_migration(name).await,
        }
    }

    /// See [`MigrationEngine::migrate`].
    pub async fn migrate(&self) -> std::result::Result<MigrationReport, MigrationError> {
        match self {
            AdapterMigrations::Document(e) => e.migrate().await,
            AdapterMigrations::Relational(e) => e.migrate().await,
        }
    }

    /// See [`MigrationEngine::status`].
    pub async fn status(&self) -> std::result::Result<Vec<MigrationStatusEntry>, MigrationError> {
        match self {
            AdapterMigrations::Document(e) => e.status().await,
            AdapterMigrations::Relational(e) => e.status().await,
        }
    }
}
