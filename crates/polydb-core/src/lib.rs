//! PolyDB Core - adapter orchestration and file-based migrations.
//!
//! This crate normalises document, relational and key-value backends behind
//! one lifecycle contract, orchestrates them as a single service and applies
//! schema migrations per backend.

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod logger;
pub mod manifest;
pub mod migration;
pub mod service;

pub use adapter::{
    Adapter, AdapterInstance, AdapterMigrations, DocumentAdapter, KeyValueAdapter,
    ModelDefinition, ModelRegistry, RelationalAdapter, SchemaSync,
};
pub use backend::{
    Association, AssociationKind, BackendClient, ColumnDef, ConnectOptions, Connection,
    DocumentClient, DocumentConnection, DocumentModel, DocumentSchema, KeyTtl, KeyValueClient,
    KeyValueConnection, ReadyState, RelationalClient, RelationalConnection, RelationalModel,
    SyncOptions, TableDefinition,
};
pub use config::{
    AdapterConfig, BackendKind, DocumentConfig, KeyValueConfig, RelationalConfig, SchemaHook,
    ServiceConfig,
};
pub use error::{BackendError, BoxError, Error, Result};
pub use logger::{Logger, SharedLogger, TracingLogger};
pub use manifest::{AdapterManifest, DriverSet, ServiceManifest};
pub use migration::{
    LedgerStore, Migration, MigrationEngine, MigrationError, MigrationRecord, MigrationRegistry,
    MigrationReport, MigrationSettings,
};
pub use service::DbService;
