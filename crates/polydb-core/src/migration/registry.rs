//! In-process registry of migration procedures.
//!
//! Migrations are compiled into the application and registered under the
//! stem of the file that represents them on disk (`20240101000000-first`
//! for `20240101000000-first.rs`). The engine pairs discovered files with
//! registrations by that stem.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::BoxError;

/// An `up` or `down` procedure run against a connection.
pub type MigrationFn<C> =
    Arc<dyn Fn(Arc<C>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A forward/rollback pair. Either side may be missing, in which case the
/// engine reports the file as invalid.
pub struct Migration<C: ?Sized> {
    up: Option<MigrationFn<C>>,
    down: Option<MigrationFn<C>>,
}

impl<C: ?Sized + Send + Sync + 'static> Migration<C> {
    /// Create a migration with neither procedure set.
    pub fn new() -> Self {
        Self {
            up: None,
            down: None,
        }
    }

    /// Set the forward procedure.
    pub fn up<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.up = Some(Arc::new(move |conn| f(conn).boxed()));
        self
    }

    /// Set the rollback procedure.
    pub fn down<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.down = Some(Arc::new(move |conn| f(conn).boxed()));
        self
    }
}

impl<C: ?Sized> Migration<C> {
    /// Forward procedure.
    pub fn up_fn(&self) -> Option<&MigrationFn<C>> {
        self.up.as_ref()
    }

    /// Rollback procedure.
    pub fn down_fn(&self) -> Option<&MigrationFn<C>> {
        self.down.as_ref()
    }

    /// Whether both procedures are present.
    pub fn is_complete(&self) -> bool {
        self.up.is_some() && self.down.is_some()
    }
}

impl<C: ?Sized + Send + Sync + 'static> Default for Migration<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> Clone for Migration<C> {
    fn clone(&self) -> Self {
        Self {
            up: self.up.clone(),
            down: self.down.clone(),
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for Migration<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("up", &self.up.is_some())
            .field("down", &self.down.is_some())
            .finish()
    }
}

/// Migrations keyed by file stem.
pub struct MigrationRegistry<C: ?Sized> {
    migrations: BTreeMap<String, Migration<C>>,
}

impl<C: ?Sized> MigrationRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Register `migration` under `stem`, replacing any previous entry.
    pub fn register(&mut self, stem: impl Into<String>, migration: Migration<C>) {
        self.migrations.insert(stem.into(), migration);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, stem: impl Into<String>, migration: Migration<C>) -> Self {
        self.register(stem, migration);
        self
    }

    /// Migration registered under `stem`.
    pub fn get(&self, stem: &str) -> Option<&Migration<C>> {
        self.migrations.get(stem)
    }

    /// Whether `stem` is registered.
    pub fn contains(&self, stem: &str) -> bool {
        self.migrations.contains_key(stem)
    }

    /// Registered stems in order.
    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<C: ?Sized> Default for MigrationRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> Clone for MigrationRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            migrations: self.migrations.clone(),
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for MigrationRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.migrations.iter()).finish()
    }
}
