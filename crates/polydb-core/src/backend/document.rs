//! Document store capabilities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Connection, SyncOptions};
use crate::error::BackendError;
use crate::migration::LedgerStore;

/// Connection state reported by a document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Not connected.
    Disconnected,
    /// Connected and usable.
    Connected,
    /// Connection in progress.
    Connecting,
    /// Close in progress.
    Disconnecting,
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadyState::Disconnected => write!(f, "disconnected"),
            ReadyState::Connected => write!(f, "connected"),
            ReadyState::Connecting => write!(f, "connecting"),
            ReadyState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Declarative schema for a document model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSchema {
    /// Collection name; defaults to the lowercased model name.
    #[serde(default)]
    pub collection: Option<String>,
    /// Indexed field paths.
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl DocumentSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store documents in a specific collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Add an indexed field.
    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(field.into());
        self
    }
}

/// Model handle bound to a document connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentModel {
    name: String,
    collection: String,
    indexes: Vec<String>,
}

impl DocumentModel {
    /// Realise a model from its schema.
    pub fn new(name: impl Into<String>, schema: &DocumentSchema) -> Self {
        let name = name.into();
        let collection = schema
            .collection
            .clone()
            .unwrap_or_else(|| name.to_lowercase());
        Self {
            name,
            collection,
            indexes: schema.indexes.clone(),
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Indexed fields.
    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }
}

/// Capabilities of an open document store connection.
#[async_trait]
pub trait DocumentConnection: Connection + LedgerStore {
    /// Current connection state.
    fn ready_state(&self) -> ReadyState;

    /// Model already registered under `name`.
    fn model(&self, name: &str) -> Option<DocumentModel>;

    /// Register a model. Fails with [`BackendError::DuplicateModel`] when the
    /// name is taken.
    fn register_model(
        &self,
        name: &str,
        schema: &DocumentSchema,
    ) -> Result<DocumentModel, BackendError>;

    /// Create a collection if it does not exist.
    async fn create_collection(&self, name: &str) -> Result<(), BackendError>;

    /// Drop a collection and its documents.
    async fn drop_collection(&self, name: &str) -> Result<(), BackendError>;

    /// Names of existing collections, sorted.
    async fn collection_names(&self) -> Result<Vec<String>, BackendError>;

    /// Insert a document, returning its generated id.
    async fn insert_document(&self, collection: &str, document: Value)
        -> Result<String, BackendError>;

    /// All documents of a collection in insertion order.
    async fn find_documents(&self, collection: &str) -> Result<Vec<Value>, BackendError>;

    /// Create (or with `force`, recreate) storage for every registered model.
    async fn sync(&self, options: &SyncOptions) -> Result<(), BackendError>;
}
