//! In-memory mock backends for integration tests.
//!
//! A [`MockBackend`] plays the role of a database server: it outlives the
//! connections opened against it, keeps the migration ledger, counts opens
//! and closes, and can be scripted to fail.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

use polydb_core::{
    BackendClient, BackendError, ConnectOptions, Connection, DocumentConnection, DocumentModel,
    DocumentSchema, KeyTtl, KeyValueConnection, LedgerStore, Logger, MigrationRecord, ReadyState,
    RelationalConnection, RelationalModel, SyncOptions, TableDefinition,
};

/// Scriptable failure switches.
#[derive(Default)]
pub struct Faults {
    pub open: AtomicBool,
    pub close: AtomicBool,
    pub probe: AtomicBool,
    pub authenticate: AtomicBool,
    pub record: AtomicBool,
}

/// Shared server-side state of a mock backend.
#[derive(Default)]
pub struct MockBackend {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub registrations: AtomicUsize,
    pub faults: Faults,
    pub ledger: Mutex<Vec<MigrationRecord>>,
    pub ledger_created: AtomicBool,
    pub syncs: Mutex<Vec<SyncOptions>>,
    pub last: Mutex<Option<Arc<MockConnection>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fail(&self, switch: &AtomicBool, on: bool) {
        switch.store(on, Ordering::SeqCst);
    }

    /// Pre-populate the ledger.
    pub fn seed_ledger(&self, names: &[&str]) {
        let mut ledger = self.ledger.lock();
        for name in names {
            ledger.push(MigrationRecord::now(*name));
        }
    }

    pub fn ledger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ledger
            .lock()
            .iter()
            .map(|r| r.migration_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.last.lock().clone()
    }

    fn open(backend: &Arc<Self>, target: &str) -> Result<Arc<MockConnection>, BackendError> {
        if backend.faults.open.load(Ordering::SeqCst) {
            return Err(BackendError::driver(format!("cannot reach {target}")));
        }
        backend.opens.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection {
            backend: Arc::clone(backend),
            target: target.to_string(),
            closed: AtomicBool::new(false),
            documents: Mutex::new(BTreeMap::new()),
            document_models: Mutex::new(BTreeMap::new()),
            tables: Mutex::new(BTreeMap::new()),
            executed: Mutex::new(Vec::new()),
            values: Mutex::new(BTreeMap::new()),
            hashes: Mutex::new(BTreeMap::new()),
        });
        *backend.last.lock() = Some(Arc::clone(&conn));
        Ok(conn)
    }
}

/// One connection to a [`MockBackend`]; implements every capability set.
pub struct MockConnection {
    backend: Arc<MockBackend>,
    target: String,
    closed: AtomicBool,
    documents: Mutex<BTreeMap<String, Vec<Value>>>,
    document_models: Mutex<BTreeMap<String, DocumentModel>>,
    tables: Mutex<BTreeMap<String, RelationalModel>>,
    pub executed: Mutex<Vec<String>>,
    values: Mutex<BTreeMap<String, Bytes>>,
    hashes: Mutex<BTreeMap<String, BTreeMap<String, Bytes>>>,
}

impl MockConnection {
    fn check_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    /// Mark the connection dead without going through `close`.
    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn describe(&self) -> String {
        format!("mock://{}", self.target)
    }

    async fn probe(&self) -> Result<bool, BackendError> {
        if self.backend.faults.probe.load(Ordering::SeqCst) {
            return Err(BackendError::driver("probe timed out"));
        }
        Ok(!self.is_closed())
    }

    async fn close(&self) -> Result<(), BackendError> {
        if self.backend.faults.close.load(Ordering::SeqCst) {
            return Err(BackendError::driver("close refused"));
        }
        self.closed.store(true, Ordering::SeqCst);
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MockConnection {
    async fn ensure_ledger(&self) -> Result<(), BackendError> {
        self.check_open()?;
        self.backend.ledger_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, BackendError> {
        self.check_open()?;
        let mut records = self.backend.ledger.lock().clone();
        records.sort_by(|a, b| a.migration_name.cmp(&b.migration_name));
        Ok(records)
    }

    async fn record_migration(&self, record: &MigrationRecord) -> Result<(), BackendError> {
        self.check_open()?;
        if self.backend.faults.record.load(Ordering::SeqCst) {
            return Err(BackendError::driver("ledger is read-only"));
        }
        let mut ledger = self.backend.ledger.lock();
        if ledger.iter().any(|r| r.migration_name == record.migration_name) {
            return Err(BackendError::DuplicateRecord(record.migration_name.clone()));
        }
        ledger.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentConnection for MockConnection {
    fn ready_state(&self) -> ReadyState {
        if self.is_closed() {
            ReadyState::Disconnected
        } else {
            ReadyState::Connected
        }
    }

    fn model(&self, name: &str) -> Option<DocumentModel> {
        self.document_models.lock().get(name).cloned()
    }

    fn register_model(
        &self,
        name: &str,
        schema: &DocumentSchema,
    ) -> Result<DocumentModel, BackendError> {
        let mut models = self.document_models.lock();
        if models.contains_key(name) {
            return Err(BackendError::DuplicateModel(name.to_string()));
        }
        self.backend.registrations.fetch_add(1, Ordering::SeqCst);
        let model = DocumentModel::new(name, schema);
        models.insert(name.to_string(), model.clone());
        Ok(model)
    }

    async fn create_collection(&self, name: &str) -> Result<(), BackendError> {
        self.documents.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), BackendError> {
        self.documents.lock().remove(name);
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.documents.lock().keys().cloned().collect())
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: Value,
    ) -> Result<String, BackendError> {
        let mut documents = self.documents.lock();
        let docs = documents.entry(collection.to_string()).or_default();
        docs.push(document);
        Ok(docs.len().to_string())
    }

    async fn find_documents(&self, collection: &str) -> Result<Vec<Value>, BackendError> {
        Ok(self
            .documents
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn sync(&self, options: &SyncOptions) -> Result<(), BackendError> {
        self.check_open()?;
        self.backend.syncs.lock().push(*options);
        Ok(())
    }
}

#[async_trait]
impl RelationalConnection for MockConnection {
    async fn authenticate(&self) -> Result<(), BackendError> {
        self.check_open()?;
        if self.backend.faults.authenticate.load(Ordering::SeqCst) {
            return Err(BackendError::driver("password authentication failed"));
        }
        Ok(())
    }

    fn database_name(&self) -> String {
        self.target.clone()
    }

    fn define(
        &self,
        name: &str,
        definition: TableDefinition,
    ) -> Result<RelationalModel, BackendError> {
        definition.validate()?;
        let mut tables = self.tables.lock();
        if tables.contains_key(name) {
            return Err(BackendError::DuplicateModel(name.to_string()));
        }
        self.backend.registrations.fetch_add(1, Ordering::SeqCst);
        let model = RelationalModel::new(name, definition);
        tables.insert(name.to_string(), model.clone());
        Ok(model)
    }

    fn model(&self, name: &str) -> Option<RelationalModel> {
        self.tables.lock().get(name).cloned()
    }

    async fn execute(&self, sql: &str) -> Result<(), BackendError> {
        self.check_open()?;
        self.executed.lock().push(sql.to_string());
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(self
            .tables
            .lock()
            .values()
            .map(|m| m.table().to_string())
            .collect())
    }

    async fn sync(&self, options: &SyncOptions) -> Result<(), BackendError> {
        self.check_open()?;
        self.backend.syncs.lock().push(*options);
        Ok(())
    }
}

#[async_trait]
impl KeyValueConnection for MockConnection {
    async fn ping(&self) -> Result<String, BackendError> {
        self.check_open()?;
        Ok("PONG".to_string())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        self.check_open()?;
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        _ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        self.check_open()?;
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        self.check_open()?;
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .values
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn del(&self, key: &str) -> Result<bool, BackendError> {
        self.check_open()?;
        Ok(self.values.lock().remove(key).is_some())
    }

    async fn expire(&self, key: &str, _ttl: Duration) -> Result<bool, BackendError> {
        self.check_open()?;
        Ok(self.values.lock().contains_key(key))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError> {
        self.check_open()?;
        Ok(if self.values.lock().contains_key(key) {
            KeyTtl::Persistent
        } else {
            KeyTtl::Missing
        })
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<bool, BackendError> {
        self.check_open()?;
        Ok(self
            .hashes
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value)
            .is_none())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>, BackendError> {
        self.check_open()?;
        Ok(self
            .hashes
            .lock()
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, Bytes>, BackendError> {
        self.check_open()?;
        Ok(self.hashes.lock().get(key).cloned().unwrap_or_default())
    }
}

/// Document client over a [`MockBackend`].
pub struct MockDocumentClient(pub Arc<MockBackend>);

#[async_trait]
impl BackendClient for MockDocumentClient {
    type Handle = dyn DocumentConnection;

    async fn open(
        &self,
        target: &str,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn DocumentConnection>, BackendError> {
        let conn: Arc<dyn DocumentConnection> = MockBackend::open(&self.0, target)?;
        Ok(conn)
    }
}

/// Relational client over a [`MockBackend`].
pub struct MockRelationalClient(pub Arc<MockBackend>);

#[async_trait]
impl BackendClient for MockRelationalClient {
    type Handle = dyn RelationalConnection;

    async fn open(
        &self,
        target: &str,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn RelationalConnection>, BackendError> {
        let conn: Arc<dyn RelationalConnection> = MockBackend::open(&self.0, target)?;
        Ok(conn)
    }
}

/// Key-value client over a [`MockBackend`].
pub struct MockKeyValueClient(pub Arc<MockBackend>);

#[async_trait]
impl BackendClient for MockKeyValueClient {
    type Handle = dyn KeyValueConnection;

    async fn open(
        &self,
        target: &str,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn KeyValueConnection>, BackendError> {
        let conn: Arc<dyn KeyValueConnection> = MockBackend::open(&self.0, target)?;
        Ok(conn)
    }
}

/// Logger capturing every line.
#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

/// Whether two connection handles point at the same connection.
pub fn same_connection<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
