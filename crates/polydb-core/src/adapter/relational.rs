//! Relational store adapter.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::models::{ModelDefinition, ModelRegistry};
use super::slot::ConnectionSlot;
use super::{Adapter, SchemaSync};
use crate::backend::{
    ConnectOptions, RelationalClient, RelationalConnection, RelationalModel, SyncOptions,
};
use crate::config::{BackendKind, RelationalConfig};
use crate::error::{BackendError, Error, Result};
use crate::logger::{default_logger, SharedLogger};
use crate::migration::{MigrationEngine, MigrationSettings};

const KIND: BackendKind = BackendKind::Relational;

/// Adapter over a relational store.
pub struct RelationalAdapter {
    name: String,
    client: Arc<RelationalClient>,
    target: String,
    options: ConnectOptions,
    definitions: BTreeMap<String, ModelDefinition>,
    migration_settings: Option<MigrationSettings<dyn RelationalConnection>>,
    logger: SharedLogger,
    slot: ConnectionSlot<dyn RelationalConnection>,
    models: RwLock<ModelRegistry<RelationalModel>>,
    engine: RwLock<Option<Arc<MigrationEngine<dyn RelationalConnection>>>>,
}

impl RelationalAdapter {
    /// Create a disconnected adapter.
    pub fn new(name: impl Into<String>, config: RelationalConfig) -> Self {
        let name = name.into();
        let logger = config.logger.unwrap_or_else(|| default_logger(&name));
        Self {
            client: config.client,
            target: config.connection_target,
            options: config.options,
            definitions: config.models,
            migration_settings: config.migrations,
            logger,
            slot: ConnectionSlot::new(KIND),
            models: RwLock::new(ModelRegistry::new()),
            engine: RwLock::new(None),
            name,
        }
    }

    /// The open connection, if any.
    pub fn connection(&self) -> Option<Arc<dyn RelationalConnection>> {
        self.slot.current()
    }

    /// Realised model by name.
    pub fn model(&self, name: &str) -> Option<RelationalModel> {
        self.models.read().get(name).cloned()
    }

    /// Snapshot of the realised models.
    pub fn models(&self) -> ModelRegistry<RelationalModel> {
        self.models.read().clone()
    }

    /// Attached migration engine.
    pub fn migrations(&self) -> Option<Arc<MigrationEngine<dyn RelationalConnection>>> {
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

    /// Realise every model, then run `associate` hooks once all exist.
    fn realise_models(
        &self,
        conn: &dyn RelationalConnection,
    ) -> std::result::Result<(), BackendError> {
        let mut registry = ModelRegistry::new();
        for (name, definition) in &self.definitions {
            let model = match conn.model(name) {
                Some(existing) => existing,
                None => definition.realise(name, conn)?,
            };
            registry.insert(name.clone(), model);
        }

        for (name, definition) in &self.definitions {
            let Some(hook) = definition.associate() else {
                continue;
            };
            let mut model = registry.require(name)?.clone();
            hook(&mut model, &registry)?;
            registry.insert(name.clone(), model);
        }

        tracing::debug!(adapter = %self.name, models = registry.len(), "relational models ready");
        *self.models.write() = registry;
        Ok(())
    }
}

#[async_trait]
impl Adapter for RelationalAdapter {
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
        if let Err(source) = conn.authenticate().await {
            if let Err(e) = conn.close().await {
                tracing::warn!(adapter = %self.name, error = %e, "failed to close unauthenticated connection");
            }
            return Err(self.fail(Error::Connection { kind: KIND, source }));
        }
        self.slot.set(Arc::clone(&conn));
        self.logger.log(&format!(
            "Successfully connected to {}",
            conn.database_name()
        ));

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
        match self.slot.current() {
            Some(conn) => match conn.authenticate().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(adapter = %self.name, error = %e, "authentication probe failed");
                    false
                }
            },
            None => false,
        }
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
            .log(&format!("Disconnected from {}", conn.database_name()));
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
impl SchemaSync for RelationalAdapter {
    async fn sync_db(&self, options: &SyncOptions) -> Result<()> {
        let conn = self.slot.require().map_err(|e| self.fail(e))?;
        conn.sync(options)
            .await
            .map_err(|source| self.fail(Error::Sync { kind: KIND, source }))?;
        self.logger.log(&format!(
            "Database {} synchronised",
            conn.database_name()
        ));
        Ok(())
    }
}
