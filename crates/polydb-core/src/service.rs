//! Service orchestrator.
//!
//! [`DbService`] holds named adapters and fans lifecycle operations out to
//! all of them concurrently. Aggregate calls fail with the first error in
//! adapter name order; peers are never cancelled and adapters that did
//! connect stay connected.

use std::collections::BTreeMap;

use futures::future::join_all;

use crate::adapter::{
    Adapter, AdapterInstance, AdapterMigrations, DocumentAdapter, KeyValueAdapter,
    RelationalAdapter,
};
use crate::backend::SyncOptions;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::manifest::{DriverSet, ServiceManifest};
use crate::migration::{MigrationError, MigrationReport};

/// Named adapters behind one lifecycle.
pub struct DbService {
    adapters: BTreeMap<String, AdapterInstance>,
}

impl DbService {
    /// Validate `config` and build one adapter per entry.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let mut adapters = BTreeMap::new();
        for (name, adapter) in config.adapters {
            if name.trim().is_empty() {
                return Err(Error::Configuration(
                    "adapter names must not be empty".to_string(),
                ));
            }
            adapter.validate(&name)?;
            tracing::debug!(adapter = %name, kind = %adapter.kind(), "configured adapter");
            adapters.insert(name.clone(), AdapterInstance::from_config(name, adapter));
        }
        Ok(Self { adapters })
    }

    /// Build the service from a declarative manifest.
    pub fn from_manifest(manifest: &ServiceManifest, drivers: &DriverSet) -> Result<Self> {
        Self::new(manifest.to_config(drivers)?)
    }

    /// Adapter names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Adapter by name.
    pub fn adapter(&self, name: &str) -> Option<&AdapterInstance> {
        self.adapters.get(name)
    }

    /// Document adapter by name.
    pub fn document(&self, name: &str) -> Option<&DocumentAdapter> {
        match self.adapters.get(name)? {
            AdapterInstance::Document(a) => Some(a),
            _ => None,
        }
    }

    /// Relational adapter by name.
    pub fn relational(&self, name: &str) -> Option<&RelationalAdapter> {
        match self.adapters.get(name)? {
            AdapterInstance::Relational(a) => Some(a),
            _ => None,
        }
    }

    /// Key-value adapter by name.
    pub fn key_value(&self, name: &str) -> Option<&KeyValueAdapter> {
        match self.adapters.get(name)? {
            AdapterInstance::KeyValue(a) => Some(a),
            _ => None,
        }
    }

    fn each(&self) -> impl Iterator<Item = &dyn Adapter> {
        self.adapters.values().map(AdapterInstance::as_adapter)
    }

    /// Connect every adapter.
    pub async fn connect(&self) -> Result<()> {
        join_all(self.each().map(|a| a.connect()))
            .await
            .into_iter()
            .collect()
    }

    /// Close every adapter.
    pub async fn close_connection(&self) -> Result<()> {
        join_all(self.each().map(|a| a.close_connection()))
            .await
            .into_iter()
            .collect()
    }

    /// Whether every adapter reports connected.
    pub async fn is_connected(&self) -> bool {
        join_all(self.each().map(|a| a.is_connected()))
            .await
            .into_iter()
            .all(|connected| connected)
    }

    /// Synchronise schemas on every adapter that supports it.
    pub async fn sync_db(&self, options: &SyncOptions) -> Result<()> {
        join_all(
            self.each()
                .filter_map(|a| a.as_schema_sync())
                .map(|s| s.sync_db(options)),
        )
        .await
        .into_iter()
        .collect()
    }

    /// Liveness of every adapter.
    pub async fn health(&self) -> BTreeMap<String, bool> {
        let results = join_all(self.each().map(|a| a.is_connected())).await;
        self.adapters.keys().cloned().zip(results).collect()
    }

    /// Attached migration engines by adapter name.
    pub fn migrations(&self) -> BTreeMap<String, AdapterMigrations> {
        self.adapters
            .iter()
            .filter_map(|(name, a)| Some((name.clone(), a.migrations()?)))
            .collect()
    }

    /// Run `migrate` on every attached engine concurrently.
    pub async fn migrate_all(
        &self,
    ) -> std::result::Result<BTreeMap<String, MigrationReport>, MigrationError> {
        let engines = self.migrations();
        let reports = join_all(engines.values().map(|e| e.migrate())).await;
        engines
            .into_keys()
            .zip(reports)
            .map(|(name, report)| report.map(|r| (name, r)))
            .collect()
    }
}

impl std::fmt::Debug for DbService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.adapters
                    .iter()
                    .map(|(name, a)| (name, a.as_adapter().kind())),
            )
            .finish()
    }
}
