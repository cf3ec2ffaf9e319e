//! Document store adapter.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::models::ModelRegistry;
use super::slot::ConnectionSlot;
use super::{Adapter, SchemaSync};
use crate::backend::{
    ConnectOptions, DocumentClient, DocumentConnection, DocumentModel, DocumentSchema, ReadyState,
    SyncOptions,
};
use crate::config::{BackendKind, DocumentConfig, SchemaHook};
use crate::error::{BackendError, Error, Result};
use crate::logger::{default_logger, SharedLogger};
use crate::migration::{MigrationEngine, MigrationSettings};

const KIND: BackendKind = BackendKind::Document;

/// Adapter over a document store.
pub struct DocumentAdapter {
    name: String,
    client: Arc<DocumentClient>,
    target: String,
    options: ConnectOptions,
    schemas: BTreeMap<String, DocumentSchema>,
    schema_hook: Option<SchemaHook>,
    migration_settings: Option<MigrationSettings<dyn DocumentConnection>>,
    logger: SharedLogger,
    slot: ConnectionSlot<dyn DocumentConnection>,
    models: RwLock<ModelRegistry<DocumentModel>>,
    engine: RwLock<Option<Arc<MigrationEngine<dyn DocumentConnection>>>>,
}

impl DocumentAdapter {
    /// Create a disconnected adapter.
    pub fn new(name: impl Into<String>, config: DocumentConfig) -> Self {
        let name = name.into();
        let logger = config.logger.unwrap_or_else(|| default_logger(&name));
        Self {
            client: config.client,
            target: config.connection_target,
            options: config.options,
            schemas: config.schemas,
            schema_hook: config.schema_hook,
            migration_settings: config.migrations,
            logger,
            slot: ConnectionSlot::new(KIND),
            models: RwLock::new(ModelRegistry::new()),
            engine: RwLock::new(None),
            name,
        }
    }

    /// The open connection, if any.
    pub fn connection(&self) -> Option<Arc<dyn DocumentConnection>> {
        self.slot.current()
    }

    /// Realised model by name.
    pub fn model(&self, name: &str) -> Option<DocumentModel> {
        self.models.read().get(name).cloned()
    }

    /// Snapshot of the realised models.
    pub fn models(&self) -> ModelRegistry<DocumentModel> {
        self.models.read().clone()
    }

    /// Attached migration engine.
    pub fn migrations(&self) -> Option<Arc<MigrationEngine<dyn DocumentConnection>>> {
        self.engine.read().clone()
    }

    /// Configured migrations directory.
    pub fn migrations_directory(&self) -> Option<&Path> {
        self.migration_settings
            .as_ref()
            .map(|s| s.directory.as_path())
    }

    fn fail(&self, err: Error) -> Error {
        self.logger.error(&err.to_string());
        err
    }

    fn realise_models(&self, conn: &dyn DocumentConnection) -> std::result::Result<(), BackendError> {
        let mut schemas = self.schemas.clone();
        if let Some(hook) = &self.schema_hook {
            hook(&mut schemas)?;
        }

        let mut registry = ModelRegistry::new();
        for (name, schema) in &schemas {
            let model = match conn.model(name) {
                Some(existing) => existing,
                None => conn.register_model(name, schema)?,
            };
            registry.insert(name.clone(), model);
        }

        tracing::debug!(adapter = %self.name, models = registry.len(), "document models ready");
        *self.models.write() = registry;
        Ok(())
    }
}

#[async_trait]
impl Adapter for DocumentAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let _guard = self.slot.lock().await;
        if let Some(conn) = self.slot.current() {
            self.logger
                .log(&format!("Already connected to {}", conn.describe()));
            return Ok(());
        }

        let conn = self
            .client
            .open(&self.target, &self.options)
            .await
            .map_err(|source| self.fail(Error::Connection { kind: KIND, source }))?;
        self.slot.set(Arc::clone(&conn));
        self.logger
            .log(&format!("Successfully connected to {}", conn.describe()));

        if let Some(settings) = &self.migration_settings {
            let engine = MigrationEngine::new(
                self.name.clone(),
                Arc::clone(&conn),
                settings.clone(),
                Arc::clone(&self.logger),
            );
            *self.engine.write() = Some(Arc::new(engine));
        }

        self.realise_models(conn.as_ref())
            .map_err(|source| self.fail(Error::ModelSetup { kind: KIND, source }))
    }

    async fn is_connected(&self) -> bool {
        self.slot
            .current()
            .is_some_and(|conn| conn.ready_state() == ReadyState::Connected)
    }

    async fn close_connection(&self) -> Result<()> {
        let _guard = self.slot.lock().await;
        let Some(conn) = self.slot.current() else {
            self.logger.log("No open connection to close");
            return Ok(());
        };

        conn.close()
            .await
            .map_err(|source| self.fail(Error::Close { kind: KIND, source }))?;
        self.slot.clear();
        *self.engine.write() = None;
        self.logger
            .log(&format!("Disconnected from {}", conn.describe()));
        Ok(())
    }

    async fn setup_models(&self) -> Result<()> {
        let conn = self.slot.require().map_err(|e| self.fail(e))?;
        self.realise_models(conn.as_ref())
            .map_err(|source| self.fail(Error::ModelSetup { kind: KIND, source }))
    }

    fn as_schema_sync(&self) -> Option<&dyn SchemaSync> {
        Some(self)
    }
}

#[async_trait]
impl SchemaSync for DocumentAdapter {
    async fn sync_db(&self, options: &SyncOptions) -> Result<()> {
        let conn = self.slot.require().map_err(|e| self.fail(e))?;
        conn.sync(options)
            .await
            .map_err(|source| self.fail(Error::Sync { kind: KIND, source }))?;
        self.logger.log("Document schema synchronised");
        Ok(())
    }
}
