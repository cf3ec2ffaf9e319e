//! Backend client contracts.
//!
//! A backend client opens connections to one kind of data store. The wire
//! protocol lives entirely behind these traits; adapters only rely on the
//! capabilities declared here.
//!
//! - [`BackendClient`]: `open(target, options)` for one backend kind
//! - [`Connection`]: liveness probe and close, shared by all kinds
//! - [`DocumentConnection`], [`RelationalConnection`], [`KeyValueConnection`]:
//!   the kind-specific capability sets

pub mod document;
pub mod key_value;
pub mod relational;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;

pub use document::{DocumentConnection, DocumentModel, DocumentSchema, ReadyState};
pub use key_value::{KeyTtl, KeyValueConnection};
pub use relational::{
    Association, AssociationKind, ColumnDef, RelationalConnection, RelationalModel,
    TableDefinition,
};

/// Capabilities every open connection provides.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Host or database label used in log lines.
    fn describe(&self) -> String;

    /// Report whether the backend answers.
    async fn probe(&self) -> Result<bool, BackendError>;

    /// Gracefully terminate the connection.
    async fn close(&self) -> Result<(), BackendError>;
}

/// Opens connections to one backend kind.
///
/// `Handle` is the connection capability set handed back, normally a trait
/// object such as `dyn RelationalConnection`.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Connection type produced by [`BackendClient::open`].
    type Handle: ?Sized + Connection;

    /// Open a connection to `target`.
    async fn open(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<Self::Handle>, BackendError>;
}

/// Client producing document store connections.
pub type DocumentClient = dyn BackendClient<Handle = dyn DocumentConnection>;

/// Client producing relational store connections.
pub type RelationalClient = dyn BackendClient<Handle = dyn RelationalConnection>;

/// Client producing key-value store connections.
pub type KeyValueClient = dyn BackendClient<Handle = dyn KeyValueConnection>;

/// Backend-specific option bag passed through to [`BackendClient::open`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectOptions(Map<String, Value>);

impl ConnectOptions {
    /// Create an empty option bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw option value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String option.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer option.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Boolean option.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ConnectOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Options for schema synchronisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Drop and recreate storage for every model.
    #[serde(default)]
    pub force: bool,
    /// Alter existing storage to match the model definitions.
    #[serde(default)]
    pub alter: bool,
}

impl SyncOptions {
    /// Drop and recreate model storage.
    pub fn force() -> Self {
        Self {
            force: true,
            alter: false,
        }
    }

    /// Alter existing storage in place.
    pub fn alter() -> Self {
        Self {
            force: false,
            alter: true,
        }
    }
}
