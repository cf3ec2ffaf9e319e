//! Document backend on embedded sled.
//!
//! Each collection is a sled tree named `collection:<name>` holding JSON
//! documents keyed by a monotonically increasing id, so iteration order is
//! insertion order. The migration ledger lives in its own `_migrations` tree.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use polydb_core::{
    BackendClient, BackendError, ConnectOptions, Connection, DocumentConnection, DocumentModel,
    DocumentSchema, LedgerStore, MigrationRecord, ReadyState, SyncOptions,
};
use serde_json::Value;
use sled::{Db, Tree};

use crate::error::DriverError;
use crate::sled_config::SledSettings;

/// Tree name prefix for collections.
const COLLECTION_PREFIX: &str = "collection:";

/// Tree name for the migration ledger.
const LEDGER_TREE: &str = "_migrations";

/// Opens sled document stores. The connection target is the database directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SledDocumentClient;

impl SledDocumentClient {
    /// Create a client.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendClient for SledDocumentClient {
    type Handle = dyn DocumentConnection;

    async fn open(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn DocumentConnection>, BackendError> {
        let conn = SledDocumentConnection::open(SledSettings::from_options(target, options)).await?;
        Ok(Arc::new(conn))
    }
}

/// One open sled document store.
pub struct SledDocumentConnection {
    settings: SledSettings,
    state: AtomicU8,
    db: RwLock<Option<Db>>,
    models: DashMap<String, DocumentModel>,
}

impl SledDocumentConnection {
    /// Open the store described by `settings`.
    pub async fn open(settings: SledSettings) -> Result<Self, BackendError> {
        let config = settings.to_sled_config();
        let db = tokio::task::spawn_blocking(move || config.open())
            .await
            .map_err(DriverError::from)?
            .map_err(DriverError::from)?;

        tracing::debug!(
            path = %settings.path,
            temporary = settings.temporary,
            recovered = db.was_recovered(),
            "opened sled document store"
        );
        Ok(Self {
            settings,
            state: AtomicU8::new(encode_state(ReadyState::Connected)),
            db: RwLock::new(Some(db)),
            models: DashMap::new(),
        })
    }

    fn db(&self) -> Result<Db, DriverError> {
        self.db.read().clone().ok_or(DriverError::Closed)
    }

    fn collection(&self, name: &str) -> Result<Tree, DriverError> {
        if name.is_empty() {
            return Err(DriverError::InvalidArgument(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(self.db()?.open_tree(collection_tree(name))?)
    }

    fn ledger(&self) -> Result<Tree, DriverError> {
        Ok(self.db()?.open_tree(LEDGER_TREE)?)
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(encode_state(state), Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for SledDocumentConnection {
    fn describe(&self) -> String {
        if self.settings.temporary {
            "sled://(temporary)".to_string()
        } else {
            format!("sled://{}", self.settings.path)
        }
    }

    async fn probe(&self) -> Result<bool, BackendError> {
        Ok(self.ready_state() == ReadyState::Connected && self.db.read().is_some())
    }

    async fn close(&self) -> Result<(), BackendError> {
        let Some(db) = self.db.read().clone() else {
            return Ok(());
        };

        self.set_state(ReadyState::Disconnecting);
        let flushed = tokio::task::spawn_blocking(move || db.flush())
            .await
            .map_err(DriverError::from)
            .and_then(|r| r.map_err(DriverError::from));
        if let Err(e) = flushed {
            self.set_state(ReadyState::Connected);
            return Err(e.into());
        }

        self.db.write().take();
        self.set_state(ReadyState::Disconnected);
        tracing::debug!(path = %self.settings.path, "closed sled document store");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SledDocumentConnection {
    async fn ensure_ledger(&self) -> Result<(), BackendError> {
        self.ledger()?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, BackendError> {
        let mut records = Vec::new();
        for entry in self.ledger()?.iter() {
            let (_, value) = entry.map_err(DriverError::from)?;
            let record: MigrationRecord =
                serde_json::from_slice(&value).map_err(DriverError::from)?;
            records.push(record);
        }
        Ok(records)
    }

    async fn record_migration(&self, record: &MigrationRecord) -> Result<(), BackendError> {
        let value = serde_json::to_vec(record).map_err(DriverError::from)?;
        let swapped = self
            .ledger()?
            .compare_and_swap(record.migration_name.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(DriverError::from)?;
        if swapped.is_err() {
            return Err(BackendError::DuplicateRecord(record.migration_name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentConnection for SledDocumentConnection {
    fn ready_state(&self) -> ReadyState {
        decode_state(self.state.load(Ordering::SeqCst))
    }

    fn model(&self, name: &str) -> Option<DocumentModel> {
        self.models.get(name).map(|m| m.value().clone())
    }

    fn register_model(
        &self,
        name: &str,
        schema: &DocumentSchema,
    ) -> Result<DocumentModel, BackendError> {
        match self.models.entry(name.to_string()) {
            Entry::Occupied(_) => Err(BackendError::DuplicateModel(name.to_string())),
            Entry::Vacant(slot) => {
                let model = DocumentModel::new(name, schema);
                slot.insert(model.clone());
                Ok(model)
            }
        }
    }

    async fn create_collection(&self, name: &str) -> Result<(), BackendError> {
        self.collection(name)?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), BackendError> {
        self.db()?
            .drop_tree(collection_tree(name))
            .map_err(DriverError::from)?;
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, BackendError> {
        let mut names: Vec<String> = self
            .db()?
            .tree_names()
            .iter()
            .filter_map(|raw| std::str::from_utf8(raw).ok())
            .filter_map(|name| name.strip_prefix(COLLECTION_PREFIX))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: Value,
    ) -> Result<String, BackendError> {
        if !document.is_object() {
            return Err(BackendError::InvalidArgument(
                "documents must be JSON objects".to_string(),
            ));
        }
        let db = self.db()?;
        let id = db.generate_id().map_err(DriverError::from)?;
        let value = serde_json::to_vec(&document).map_err(DriverError::from)?;
        self.collection(collection)?
            .insert(id.to_be_bytes(), value)
            .map_err(DriverError::from)?;
        Ok(id.to_string())
    }

    async fn find_documents(&self, collection: &str) -> Result<Vec<Value>, BackendError> {
        let mut documents = Vec::new();
        for entry in self.collection(collection)?.iter() {
            let (_, value) = entry.map_err(DriverError::from)?;
            documents.push(serde_json::from_slice(&value).map_err(DriverError::from)?);
        }
        Ok(documents)
    }

    async fn sync(&self, options: &SyncOptions) -> Result<(), BackendError> {
        let db = self.db()?;
        let collections: Vec<String> = self
            .models
            .iter()
            .map(|m| m.value().collection().to_string())
            .collect();

        for collection in &collections {
            if options.force {
                db.drop_tree(collection_tree(collection))
                    .map_err(DriverError::from)?;
            }
            self.collection(collection)?;
        }

        tracing::debug!(
            path = %self.settings.path,
            collections = collections.len(),
            force = options.force,
            "synchronised sled collections"
        );
        Ok(())
    }
}

fn collection_tree(name: &str) -> String {
    format!("{COLLECTION_PREFIX}{name}")
}

fn encode_state(state: ReadyState) -> u8 {
    match state {
        ReadyState::Disconnected => 0,
        ReadyState::Connected => 1,
        ReadyState::Connecting => 2,
        ReadyState::Disconnecting => 3,
    }
}

fn decode_state(raw: u8) -> ReadyState {
    match raw {
        1 => ReadyState::Connected,
        2 => ReadyState::Connecting,
        3 => ReadyState::Disconnecting,
        _ => ReadyState::Disconnected,
    }
}
