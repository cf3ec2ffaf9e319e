//! PolyDB Drivers - embedded backend clients.
//!
//! - [`SqliteClient`]: relational store on SQLite
//! - [`SledDocumentClient`]: document store on sled
//! - [`SledKeyValueClient`]: key-value store on sled

pub mod document;
pub mod error;
pub mod key_value;
pub mod sled_config;
pub mod sqlite;

use std::sync::Arc;

use polydb_core::DriverSet;

pub use document::{SledDocumentClient, SledDocumentConnection};
pub use error::DriverError;
pub use key_value::{SledKeyValueClient, SledKeyValueConnection};
pub use sled_config::SledSettings;
pub use sqlite::{SqliteClient, SqliteConnection, MEMORY_TARGET};

/// A [`DriverSet`] with every built-in client registered.
pub fn builtin() -> DriverSet {
    DriverSet::new()
        .with_document(Arc::new(SledDocumentClient::new()))
        .with_relational(Arc::new(SqliteClient::new()))
        .with_key_value(Arc::new(SledKeyValueClient::new()))
}
