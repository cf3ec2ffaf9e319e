//! Declarative JSON manifest.
//!
//! ```json
//! {
//!   "adapters": {
//!     "main": {
//!       "kind": "relational",
//!       "connectionTarget": "data/main.db",
//!       "models": { "Contact": { "table": "contacts", "columns": [{ "name": "email", "type": "TEXT" }] } },
//!       "migrationsDirectory": "migrations/main"
//!     },
//!     "cache": { "kind": "key-value", "connectionTarget": "data/cache" }
//!   }
//! }
//! ```
//!
//! Document models map names to [`DocumentSchema`]s, relational models to
//! [`TableDefinition`]s. Migration procedures cannot be declared in JSON;
//! attach them with [`ServiceConfig::register_relational_migrations`] and
//! [`ServiceConfig::register_document_migrations`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapter::ModelDefinition;
use crate::backend::{
    ConnectOptions, DocumentClient, DocumentSchema, KeyValueClient, RelationalClient,
    TableDefinition,
};
use crate::config::{
    AdapterConfig, BackendKind, DocumentConfig, KeyValueConfig, RelationalConfig, ServiceConfig,
};
use crate::error::{Error, Result};
use crate::migration::naming::DEFAULT_EXTENSION;
use crate::migration::MigrationSettings;

/// Adapter entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterManifest {
    /// Backend kind: `document`, `relational` or `key-value`.
    pub kind: String,
    /// Connection target.
    pub connection_target: String,
    /// Declarative models keyed by name.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub models: Map<String, Value>,
    /// Migrations directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrations_directory: Option<PathBuf>,
    /// Migration file extension; defaults to `rs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_extension: Option<String>,
    /// Backend-specific options.
    #[serde(default, skip_serializing_if = "ConnectOptions::is_empty")]
    pub options: ConnectOptions,
}

/// A whole manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceManifest {
    /// Adapters keyed by logical name.
    pub adapters: BTreeMap<String, AdapterManifest>,
}

impl ServiceManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid manifest: {e}")))
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Resolve every entry against `drivers`.
    pub fn to_config(&self, drivers: &DriverSet) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::new();
        for (name, entry) in &self.adapters {
            let adapter = entry.to_config(name, drivers)?;
            config.adapters.insert(name.clone(), adapter);
        }
        Ok(config)
    }
}

impl AdapterManifest {
    /// Resolve this entry into an [`AdapterConfig`].
    pub fn to_config(&self, name: &str, drivers: &DriverSet) -> Result<AdapterConfig> {
        let kind: BackendKind = self.kind.parse()?;
        let extension = self
            .migration_extension
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

        let config = match kind {
            BackendKind::Document => {
                let client = drivers.document.clone().ok_or_else(|| missing_driver(kind))?;
                let mut config = DocumentConfig::new(client, &self.connection_target)
                    .with_options(self.options.clone());
                for (model, schema) in &self.models {
                    config = config.with_model(model, parse_model::<DocumentSchema>(name, model, schema)?);
                }
                if let Some(dir) = &self.migrations_directory {
                    config = config
                        .with_migrations(MigrationSettings::new(dir).with_extension(&extension));
                }
                AdapterConfig::Document(config)
            }
            BackendKind::Relational => {
                let client = drivers
                    .relational
                    .clone()
                    .ok_or_else(|| missing_driver(kind))?;
                let mut config = RelationalConfig::new(client, &self.connection_target)
                    .with_options(self.options.clone());
                for (model, definition) in &self.models {
                    let definition = parse_model::<TableDefinition>(name, model, definition)?;
                    config = config.with_model(model, ModelDefinition::table(definition));
                }
                if let Some(dir) = &self.migrations_directory {
                    config = config
                        .with_migrations(MigrationSettings::new(dir).with_extension(&extension));
                }
                AdapterConfig::Relational(config)
            }
            BackendKind::KeyValue => {
                let client = drivers
                    .key_value
                    .clone()
                    .ok_or_else(|| missing_driver(kind))?;
                if self.migrations_directory.is_some() {
                    tracing::warn!(adapter = %name, "key-value adapters do not run migrations; ignoring migrationsDirectory");
                }
                AdapterConfig::KeyValue(
                    KeyValueConfig::new(client, &self.connection_target)
                        .with_options(self.options.clone()),
                )
            }
        };
        Ok(config)
    }
}

fn parse_model<T: DeserializeOwned>(adapter: &str, model: &str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        Error::Configuration(format!("adapter {adapter}: invalid model {model}: {e}"))
    })
}

fn missing_driver(kind: BackendKind) -> Error {
    Error::Configuration(format!("no {kind} driver available"))
}

/// Backend clients available to manifest-built services.
#[derive(Clone, Default)]
pub struct DriverSet {
    /// Document store client.
    pub document: Option<Arc<DocumentClient>>,
    /// Relational store client.
    pub relational: Option<Arc<RelationalClient>>,
    /// Key-value store client.
    pub key_value: Option<Arc<KeyValueClient>>,
}

impl DriverSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `client` for document adapters.
    pub fn with_document(mut self, client: Arc<DocumentClient>) -> Self {
        self.document = Some(client);
        self
    }

    /// Use `client` for relational adapters.
    pub fn with_relational(mut self, client: Arc<RelationalClient>) -> Self {
        self.relational = Some(client);
        self
    }

    /// Use `client` for key-value adapters.
    pub fn with_key_value(mut self, client: Arc<KeyValueClient>) -> Self {
        self.key_value = Some(client);
        self
    }
}

impl std::fmt::Debug for DriverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSet")
            .field("document", &self.document.is_some())
            .field("relational", &self.relational.is_some())
            .field("key_value", &self.key_value.is_some())
            .finish()
    }
}
