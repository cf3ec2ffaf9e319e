//! Service and adapter configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::models::ModelDefinition;
use crate::backend::{
    ConnectOptions, DocumentClient, DocumentConnection, DocumentSchema, KeyValueClient,
    RelationalClient, RelationalConnection,
};
use crate::error::{BackendError, Error, Result};
use crate::logger::SharedLogger;
use crate::migration::{MigrationRegistry, MigrationSettings};

/// Backend kind of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// Document store.
    Document,
    /// Relational store.
    Relational,
    /// Key-value store.
    KeyValue,
}

impl BackendKind {
    /// Canonical name used in manifests and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Relational => "relational",
            BackendKind::KeyValue => "key-value",
        }
    }

    /// Name of the collection/table holding the migration ledger.
    pub fn ledger_name(&self) -> Option<&'static str> {
        match self {
            BackendKind::Document => Some("_migrations"),
            BackendKind::Relational => Some("schema_migrations"),
            BackendKind::KeyValue => None,
        }
    }

    /// Whether adapters of this kind must be configured with models.
    pub fn requires_models(&self) -> bool {
        !matches!(self, BackendKind::KeyValue)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "document" | "mongodb" => Ok(BackendKind::Document),
            "relational" | "sql" => Ok(BackendKind::Relational),
            "key-value" | "keyvalue" | "redis" => Ok(BackendKind::KeyValue),
            other => Err(Error::Configuration(format!(
                "unsupported database type: {other}"
            ))),
        }
    }
}

/// Hook run on the document schemas before models are realised.
pub type SchemaHook =
    Arc<dyn Fn(&mut BTreeMap<String, DocumentSchema>) -> Result<(), BackendError> + Send + Sync>;

/// Document adapter configuration.
#[derive(Clone)]
pub struct DocumentConfig {
    /// Client used to open the connection.
    pub client: Arc<DocumentClient>,
    /// Connection target (URI or path).
    pub connection_target: String,
    /// Model schemas keyed by model name.
    pub schemas: BTreeMap<String, DocumentSchema>,
    /// Schema hook.
    pub schema_hook: Option<SchemaHook>,
    /// Migrations, if the adapter manages any.
    pub migrations: Option<MigrationSettings<dyn DocumentConnection>>,
    /// Backend-specific options.
    pub options: ConnectOptions,
    /// Logger override.
    pub logger: Option<SharedLogger>,
}

impl DocumentConfig {
    /// Create a configuration with no models.
    pub fn new(client: Arc<DocumentClient>, connection_target: impl Into<String>) -> Self {
        Self {
            client,
            connection_target: connection_target.into(),
            schemas: BTreeMap::new(),
            schema_hook: None,
            migrations: None,
            options: ConnectOptions::new(),
            logger: None,
        }
    }

    /// Add a model.
    pub fn with_model(mut self, name: impl Into<String>, schema: DocumentSchema) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    /// Run `hook` on the schemas before models are realised.
    pub fn with_schema_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut BTreeMap<String, DocumentSchema>) -> Result<(), BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.schema_hook = Some(Arc::new(hook));
        self
    }

    /// Manage migrations.
    pub fn with_migrations(mut self, settings: MigrationSettings<dyn DocumentConnection>) -> Self {
        self.migrations = Some(settings);
        self
    }

    /// Set backend options.
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Override the logger.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Relational adapter configuration.
#[derive(Clone)]
pub struct RelationalConfig {
    /// Client used to open the connection.
    pub client: Arc<RelationalClient>,
    /// Connection target (URI or path).
    pub connection_target: String,
    /// Model definitions keyed by model name.
    pub models: BTreeMap<String, ModelDefinition>,
    /// Migrations, if the adapter manages any.
    pub migrations: Option<MigrationSettings<dyn RelationalConnection>>,
    /// Backend-specific options.
    pub options: ConnectOptions,
    /// Logger override.
    pub logger: Option<SharedLogger>,
}

impl RelationalConfig {
    /// Create a configuration with no models.
    pub fn new(client: Arc<RelationalClient>, connection_target: impl Into<String>) -> Self {
        Self {
            client,
            connection_target: connection_target.into(),
            models: BTreeMap::new(),
            migrations: None,
            options: ConnectOptions::new(),
            logger: None,
        }
    }

    /// Add a model.
    pub fn with_model(mut self, name: impl Into<String>, definition: ModelDefinition) -> Self {
        self.models.insert(name.into(), definition);
        self
    }

    /// Manage migrations.
    pub fn with_migrations(
        mut self,
        settings: MigrationSettings<dyn RelationalConnection>,
    ) -> Self {
        self.migrations = Some(settings);
        self
    }

    /// Set backend options.
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Override the logger.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Key-value adapter configuration.
#[derive(Clone)]
pub struct KeyValueConfig {
    /// Client used to open the connection.
    pub client: Arc<KeyValueClient>,
    /// Connection target (URI or path).
    pub connection_target: String,
    /// Backend-specific options.
    pub options: ConnectOptions,
    /// Logger override.
    pub logger: Option<SharedLogger>,
    /// Logger receiving every command; defaults to the adapter logger.
    pub transaction_logger: Option<SharedLogger>,
}

impl KeyValueConfig {
    /// Create a configuration.
    pub fn new(client: Arc<KeyValueClient>, connection_target: impl Into<String>) -> Self {
        Self {
            client,
            connection_target: connection_target.into(),
            options: ConnectOptions::new(),
            logger: None,
            transaction_logger: None,
        }
    }

    /// Set backend options.
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Override the logger.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Log commands on a dedicated logger.
    pub fn with_transaction_logger(mut self, logger: SharedLogger) -> Self {
        self.transaction_logger = Some(logger);
        self
    }
}

/// Configuration of one adapter.
#[derive(Clone)]
pub enum AdapterConfig {
    /// Document adapter.
    Document(DocumentConfig),
    /// Relational adapter.
    Relational(RelationalConfig),
    /// Key-value adapter.
    KeyValue(KeyValueConfig),
}

impl AdapterConfig {
    /// Backend kind.
    pub fn kind(&self) -> BackendKind {
        match self {
            AdapterConfig::Document(_) => BackendKind::Document,
            AdapterConfig::Relational(_) => BackendKind::Relational,
            AdapterConfig::KeyValue(_) => BackendKind::KeyValue,
        }
    }

    /// Connection target.
    pub fn connection_target(&self) -> &str {
        match self {
            AdapterConfig::Document(c) => &c.connection_target,
            AdapterConfig::Relational(c) => &c.connection_target,
            AdapterConfig::KeyValue(c) => &c.connection_target,
        }
    }

    fn model_count(&self) -> usize {
        match self {
            AdapterConfig::Document(c) => c.schemas.len(),
            AdapterConfig::Relational(c) => c.models.len(),
            AdapterConfig::KeyValue(_) => 0,
        }
    }

    /// Check the entry is usable.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.connection_target().trim().is_empty() {
            return Err(Error::Configuration(format!(
                "adapter {name}: connection target is empty"
            )));
        }
        if self.kind().requires_models() && self.model_count() == 0 {
            return Err(Error::Configuration(format!(
                "adapter {name}: models are required for {} adapters",
                self.kind()
            )));
        }
        Ok(())
    }
}

impl From<DocumentConfig> for AdapterConfig {
    fn from(config: DocumentConfig) -> Self {
        AdapterConfig::Document(config)
    }
}

impl From<RelationalConfig> for AdapterConfig {
    fn from(config: RelationalConfig) -> Self {
        AdapterConfig::Relational(config)
    }
}

impl From<KeyValueConfig> for AdapterConfig {
    fn from(config: KeyValueConfig) -> Self {
        AdapterConfig::KeyValue(config)
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("kind", &self.kind())
            .field("connection_target", &self.connection_target())
            .field("models", &self.model_count())
            .finish_non_exhaustive()
    }
}

/// Named adapter configurations. Names are unique.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Adapters keyed by logical name.
    pub adapters: BTreeMap<String, AdapterConfig>,
}

impl ServiceConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an adapter.
    pub fn with_adapter(mut self, name: impl Into<String>, config: impl Into<AdapterConfig>) -> Self {
        self.adapters.insert(name.into(), config.into());
        self
    }

    /// Attach compiled migrations to a document adapter that has a
    /// migrations directory.
    pub fn register_document_migrations(
        &mut self,
        name: &str,
        registry: MigrationRegistry<dyn DocumentConnection>,
    ) -> Result<()> {
        match self.adapters.get_mut(name) {
            Some(AdapterConfig::Document(config)) => {
                let settings = config.migrations.as_mut().ok_or_else(|| no_directory(name))?;
                settings.registry = Arc::new(registry);
                Ok(())
            }
            _ => Err(Error::Configuration(format!(
                "no document adapter named {name}"
            ))),
        }
    }

    /// Attach compiled migrations to a relational adapter that has a
    /// migrations directory.
    pub fn register_relational_migrations(
        &mut self,
        name: &str,
        registry: MigrationRegistry<dyn RelationalConnection>,
    ) -> Result<()> {
        match self.adapters.get_mut(name) {
            Some(AdapterConfig::Relational(config)) => {
                let settings = config.migrations.as_mut().ok_or_else(|| no_directory(name))?;
                settings.registry = Arc::new(registry);
                Ok(())
            }
            _ => Err(Error::Configuration(format!(
                "no relational adapter named {name}"
            ))),
        }
    }
}

fn no_directory(name: &str) -> Error {
    Error::Configuration(format!("adapter {name} has no migrations directory"))
}
