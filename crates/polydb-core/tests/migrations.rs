//! Integration tests for the migration engine.

mod common;

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::{same_connection, MockBackend, MockDocumentClient, MockRelationalClient};
use parking_lot::Mutex;
use polydb_core::migration::{EngineState, MigrationError};
use polydb_core::{
    Adapter, BoxError, DbService, DocumentAdapter, DocumentConfig, DocumentConnection,
    DocumentSchema, Migration, MigrationRegistry, MigrationSettings, ModelDefinition,
    RelationalAdapter, RelationalConfig, RelationalConnection, ServiceConfig, TableDefinition,
};
use serde_json::json;

type Calls = Arc<Mutex<Vec<String>>>;
type Relational = dyn RelationalConnection;

/// Migration that records its `up` and `down` calls.
fn recorded(calls: &Calls, stem: &str) -> Migration<Relational> {
    let (up_calls, down_calls) = (Arc::clone(calls), Arc::clone(calls));
    let (up_stem, down_stem) = (stem.to_string(), stem.to_string());
    Migration::new()
        .up(move |_db: Arc<Relational>| {
            let calls = Arc::clone(&up_calls);
            let stem = up_stem.clone();
            async move {
                calls.lock().push(format!("up:{stem}"));
                Ok(())
            }
        })
        .down(move |_db: Arc<Relational>| {
            let calls = Arc::clone(&down_calls);
            let stem = down_stem.clone();
            async move {
                calls.lock().push(format!("down:{stem}"));
                Ok(())
            }
        })
}

/// Migration whose `up` always fails; `down` records the handle it got.
fn failing(calls: &Calls, seen: &Arc<Mutex<Option<Arc<Relational>>>>, down_ok: bool) -> Migration<Relational> {
    let down_calls = Arc::clone(calls);
    let seen = Arc::clone(seen);
    Migration::new()
        .up(|_db: Arc<Relational>| async move { Err::<(), BoxError>("constraint violated".into()) })
        .down(move |db: Arc<Relational>| {
            let calls = Arc::clone(&down_calls);
            let seen = Arc::clone(&seen);
            async move {
                calls.lock().push("down:failing".to_string());
                *seen.lock() = Some(db);
                if down_ok {
                    Ok(())
                } else {
                    Err::<(), BoxError>("table is locked".into())
                }
            }
        })
}

fn touch(dir: &Path, files: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for file in files {
        std::fs::write(dir.join(file), "").unwrap();
    }
}

fn relational_adapter(
    backend: &Arc<MockBackend>,
    dir: &Path,
    registry: MigrationRegistry<Relational>,
) -> RelationalAdapter {
    let config = RelationalConfig::new(Arc::new(MockRelationalClient(Arc::clone(backend))), "crm")
        .with_model(
            "Contact",
            ModelDefinition::table(TableDefinition::new("contacts").column("email", "TEXT")),
        )
        .with_migrations(MigrationSettings::new(dir).with_registry(registry));
    RelationalAdapter::new("crm", config)
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_init_seeds_first_migration() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, &dir, MigrationRegistry::new());
    adapter.connect().await.unwrap();
    let engine = adapter.migrations().unwrap();

    let seeded = engine.init().await.unwrap().unwrap();
    let files = files_in(&dir);
    assert_eq!(files.len(), 1);

    let name = &files[0];
    let (timestamp, rest) = name.split_at(14);
    assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(rest, "-first.rs");
    assert_eq!(seeded.file_name().unwrap().to_str(), Some(name.as_str()));

    let contents = std::fs::read_to_string(&seeded).unwrap();
    assert!(contents.contains("Migration<dyn RelationalConnection>"));
    assert!(contents.contains(".up("));
    assert!(contents.contains(".down("));

    // Already initialised: nothing new.
    assert!(engine.init().await.unwrap().is_none());
    assert_eq!(files_in(&dir).len(), 1);
}

#[tokio::test]
async fn test_init_seeds_empty_existing_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), MigrationRegistry::new());
    adapter.connect().await.unwrap();

    assert!(adapter.migrations().unwrap().init().await.unwrap().is_some());
    assert_eq!(files_in(tmp.path()).len(), 1);
}

#[tokio::test]
async fn test_generate_migration_refuses_bad_names_and_overwrites() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), MigrationRegistry::new());
    adapter.connect().await.unwrap();
    let engine = adapter.migrations().unwrap();

    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let path = engine.generate_migration_at("add_users", at).await.unwrap();
    assert!(path.ends_with("20240102030405-add_users.rs"));

    let err = engine.generate_migration_at("add_users", at).await.unwrap_err();
    assert!(matches!(err, MigrationError::AlreadyExists { .. }));

    let err = engine.generate_migration("add users").await.unwrap_err();
    assert!(matches!(err, MigrationError::InvalidName { .. }));
    assert_eq!(files_in(tmp.path()).len(), 1);
}

#[tokio::test]
async fn test_migrate_applies_only_pending_files_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    touch(
        tmp.path(),
        &[
            "20240103000000-c.rs",
            "20240101000000-a.rs",
            "20240102000000-b.rs",
            "20240104000000-d.rs",
        ],
    );
    let calls: Calls = Arc::default();
    let registry = ["20240101000000-a", "20240102000000-b", "20240103000000-c", "20240104000000-d"]
        .iter()
        .fold(MigrationRegistry::new(), |r, stem| r.with(*stem, recorded(&calls, stem)));

    let backend = MockBackend::new();
    backend.seed_ledger(&["20240101000000-a.rs", "20240103000000-c.rs"]);
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();

    let report = adapter.migrations().unwrap().migrate().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.attempted(), 2);
    assert_eq!(report.applied, vec!["20240102000000-b.rs", "20240104000000-d.rs"]);
    assert_eq!(
        calls.lock().as_slice(),
        &["up:20240102000000-b", "up:20240104000000-d"]
    );
    assert_eq!(backend.ledger_names().len(), 4);
}

#[tokio::test]
async fn test_applied_migration_is_never_reapplied() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20240101000000-a.rs"]);
    let calls: Calls = Arc::default();
    let registry =
        MigrationRegistry::new().with("20240101000000-a", recorded(&calls, "20240101000000-a"));

    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();
    let engine = adapter.migrations().unwrap();

    assert_eq!(engine.migrate().await.unwrap().applied.len(), 1);
    let second = engine.migrate().await.unwrap();
    assert_eq!(second.attempted(), 0);
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_failed_up_runs_down_and_batch_continues() {
    let tmp = tempfile::tempdir().unwrap();
    touch(
        tmp.path(),
        &["20240101000000-a.rs", "20240102000000-failing.rs", "20240103000000-c.rs"],
    );
    let calls: Calls = Arc::default();
    let seen = Arc::new(Mutex::new(None));
    let registry = MigrationRegistry::new()
        .with("20240101000000-a", recorded(&calls, "20240101000000-a"))
        .with("20240102000000-failing", failing(&calls, &seen, true))
        .with("20240103000000-c", recorded(&calls, "20240103000000-c"));

    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();
    let engine = adapter.migrations().unwrap();

    let report = engine.migrate().await.unwrap();
    assert_eq!(report.applied, vec!["20240101000000-a.rs", "20240103000000-c.rs"]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        &report.failed[0],
        MigrationError::Apply { file, .. } if file == "20240102000000-failing.rs"
    ));
    assert_eq!(
        calls.lock().as_slice(),
        &["up:20240101000000-a", "down:failing", "up:20240103000000-c"]
    );

    // `down` got the adapter's own connection.
    let handle = seen.lock().clone().unwrap();
    assert!(same_connection(&handle, &adapter.connection().unwrap()));

    // Not recorded, so the next run retries it.
    assert!(!backend
        .ledger_names()
        .contains(&"20240102000000-failing.rs".to_string()));
    let retry = engine.migrate().await.unwrap();
    assert_eq!(retry.attempted(), 1);
    assert_eq!(retry.failed.len(), 1);
}

#[tokio::test]
async fn test_failed_down_is_reported_as_undefined_state() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20240102000000-failing.rs"]);
    let calls: Calls = Arc::default();
    let seen = Arc::new(Mutex::new(None));
    let registry =
        MigrationRegistry::new().with("20240102000000-failing", failing(&calls, &seen, false));

    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();

    let report = adapter.migrations().unwrap().migrate().await.unwrap();
    match &report.failed[..] {
        [MigrationError::UndefinedState { file, up, down }] => {
            assert_eq!(file, "20240102000000-failing.rs");
            assert_eq!(up.to_string(), "constraint violated");
            assert_eq!(down.to_string(), "table is locked");
        }
        other => panic!("unexpected failures: {other:?}"),
    }
    assert!(backend.ledger_names().is_empty());
}

#[tokio::test]
async fn test_unregistered_or_incomplete_files_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    touch(
        tmp.path(),
        &["20240101000000-orphan.rs", "20240102000000-half.rs", "20240103000000-ok.rs"],
    );
    let calls: Calls = Arc::default();
    let registry = MigrationRegistry::new()
        .with(
            "20240102000000-half",
            Migration::new().up(|_db: Arc<Relational>| async move { Ok::<(), BoxError>(()) }),
        )
        .with("20240103000000-ok", recorded(&calls, "20240103000000-ok"));

    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();

    let report = adapter.migrations().unwrap().migrate().await.unwrap();
    assert_eq!(report.applied, vec!["20240103000000-ok.rs"]);
    let invalid: Vec<_> = report.invalid.iter().filter_map(|e| e.file()).collect();
    assert_eq!(invalid, vec!["20240101000000-orphan.rs", "20240102000000-half.rs"]);
    assert!(report
        .invalid
        .iter()
        .all(|e| matches!(e, MigrationError::InvalidFile { .. })));
    assert_eq!(backend.ledger_names(), vec!["20240103000000-ok.rs"]);
}

#[tokio::test]
async fn test_ledger_write_failure_rolls_back() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20240101000000-a.rs"]);
    let calls: Calls = Arc::default();
    let registry =
        MigrationRegistry::new().with("20240101000000-a", recorded(&calls, "20240101000000-a"));

    let backend = MockBackend::new();
    backend.fail(&backend.faults.record, true);
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();

    let report = adapter.migrations().unwrap().migrate().await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        calls.lock().as_slice(),
        &["up:20240101000000-a", "down:20240101000000-a"]
    );
}

#[tokio::test]
async fn test_custom_extension_and_short_timestamps() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20200101-first.x", "20200102-second.x", "notes.md"]);
    let calls: Calls = Arc::default();
    let registry = MigrationRegistry::new()
        .with("20200101-first", recorded(&calls, "20200101-first"))
        .with("20200102-second", recorded(&calls, "20200102-second"));

    let backend = MockBackend::new();
    backend.seed_ledger(&["20200101-first.x"]);
    let config = RelationalConfig::new(Arc::new(MockRelationalClient(Arc::clone(&backend))), "crm")
        .with_model("Contact", ModelDefinition::table(TableDefinition::new("contacts")))
        .with_migrations(
            MigrationSettings::new(tmp.path())
                .with_extension("x")
                .with_registry(registry),
        );
    let adapter = RelationalAdapter::new("crm", config);
    adapter.connect().await.unwrap();

    let report = adapter.migrations().unwrap().migrate().await.unwrap();
    assert_eq!(report.applied, vec!["20200102-second.x"]);
    assert_eq!(calls.lock().as_slice(), &["up:20200102-second"]);
    assert_eq!(
        backend.ledger_names(),
        vec!["20200101-first.x", "20200102-second.x"]
    );
}

#[tokio::test]
async fn test_status_lists_files_with_ledger_state() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20240101000000-a.rs", "20240102000000-b.rs"]);
    let calls: Calls = Arc::default();
    let registry =
        MigrationRegistry::new().with("20240101000000-a", recorded(&calls, "20240101000000-a"));

    let backend = MockBackend::new();
    backend.seed_ledger(&["20240101000000-a.rs"]);
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();

    let status = adapter.migrations().unwrap().status().await.unwrap();
    assert_eq!(status.len(), 2);
    assert!(status[0].is_applied());
    assert!(status[0].registered);
    assert!(!status[1].is_applied());
    assert!(!status[1].registered);
    assert!(backend.ledger_created.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn test_migrate_fails_fast_on_dead_connection() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), MigrationRegistry::new());
    adapter.connect().await.unwrap();
    let engine = adapter.migrations().unwrap();

    backend.last_connection().unwrap().kill();
    let err = engine.migrate().await.unwrap_err();
    assert!(matches!(err, MigrationError::Connect(_)));
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_missing_directory_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, &tmp.path().join("absent"), MigrationRegistry::new());
    adapter.connect().await.unwrap();

    let err = adapter.migrations().unwrap().migrate().await.unwrap_err();
    assert!(matches!(err, MigrationError::Directory { .. }));
}

#[tokio::test]
async fn test_concurrent_migrate_calls_apply_each_file_once() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20240101000000-a.rs", "20240102000000-b.rs"]);
    let calls: Calls = Arc::default();
    let registry = MigrationRegistry::new()
        .with("20240101000000-a", recorded(&calls, "20240101000000-a"))
        .with("20240102000000-b", recorded(&calls, "20240102000000-b"));

    let backend = MockBackend::new();
    let adapter = relational_adapter(&backend, tmp.path(), registry);
    adapter.connect().await.unwrap();
    let engine = adapter.migrations().unwrap();

    let (first, second) = tokio::join!(engine.migrate(), engine.migrate());
    let applied = first.unwrap().applied.len() + second.unwrap().applied.len();
    assert_eq!(applied, 2);
    assert_eq!(calls.lock().len(), 2);
}

#[tokio::test]
async fn test_document_migrations_use_document_connection() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["20240101000000-seed_users.rs"]);
    let registry = MigrationRegistry::<dyn DocumentConnection>::new().with(
        "20240101000000-seed_users",
        Migration::new()
            .up(|db: Arc<dyn DocumentConnection>| async move {
                db.insert_document("user", json!({"name": "alice"})).await?;
                Ok::<(), BoxError>(())
            })
            .down(|db: Arc<dyn DocumentConnection>| async move {
                db.drop_collection("user").await?;
                Ok::<(), BoxError>(())
            }),
    );

    let backend = MockBackend::new();
    let config = DocumentConfig::new(Arc::new(MockDocumentClient(Arc::clone(&backend))), "docs")
        .with_model("User", DocumentSchema::new())
        .with_migrations(MigrationSettings::new(tmp.path()).with_registry(registry));
    let adapter = DocumentAdapter::new("docs", config);
    adapter.connect().await.unwrap();

    let report = adapter.migrations().unwrap().migrate().await.unwrap();
    assert_eq!(report.applied.len(), 1);

    let docs = adapter
        .connection()
        .unwrap()
        .find_documents("user")
        .await
        .unwrap();
    assert_eq!(docs, vec![json!({"name": "alice"})]);
}

#[tokio::test]
async fn test_migrate_all_runs_every_engine() {
    let sql_dir = tempfile::tempdir().unwrap();
    touch(sql_dir.path(), &["20240101000000-a.rs"]);
    let calls: Calls = Arc::default();
    let registry =
        MigrationRegistry::new().with("20240101000000-a", recorded(&calls, "20240101000000-a"));

    let docs = MockBackend::new();
    let sql = MockBackend::new();
    let service = DbService::new(
        ServiceConfig::new()
            .with_adapter(
                "docs",
                DocumentConfig::new(Arc::new(MockDocumentClient(Arc::clone(&docs))), "docs")
                    .with_model("User", DocumentSchema::new()),
            )
            .with_adapter("crm", relational_adapter_config(&sql, sql_dir.path(), registry)),
    )
    .unwrap();

    // Engines attach on connect.
    assert!(service.migrations().is_empty());
    service.connect().await.unwrap();

    let reports = service.migrate_all().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports["crm"].applied, vec!["20240101000000-a.rs"]);
    assert!(service.adapter("crm").unwrap().has_migrations());
    assert!(!service.adapter("docs").unwrap().has_migrations());
    assert!(service.relational("crm").unwrap().is_connected().await);
}

fn relational_adapter_config(
    backend: &Arc<MockBackend>,
    dir: &Path,
    registry: MigrationRegistry<Relational>,
) -> RelationalConfig {
    RelationalConfig::new(Arc::new(MockRelationalClient(Arc::clone(backend))), "crm")
        .with_model("Contact", ModelDefinition::table(TableDefinition::new("contacts")))
        .with_migrations(MigrationSettings::new(dir).with_registry(registry))
}
