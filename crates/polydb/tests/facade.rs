//! The façade exposes everything a generated migration file imports.

use std::sync::Arc;

use polydb::drivers::{SqliteClient, MEMORY_TARGET};
use polydb::migration::Migration;
use polydb::{
    BoxError, DbService, MigrationRegistry, MigrationSettings, ModelDefinition, RelationalConfig,
    RelationalConnection, ServiceConfig, SyncOptions, TableDefinition,
};

/// Same shape as the skeleton `generate` writes, with a body filled in.
fn add_notes() -> Migration<dyn RelationalConnection> {
    Migration::new()
        .up(|db: Arc<dyn RelationalConnection>| async move {
            db.execute("ALTER TABLE contacts ADD COLUMN notes TEXT").await?;
            Ok::<(), BoxError>(())
        })
        .down(|db: Arc<dyn RelationalConnection>| async move {
            db.execute("ALTER TABLE contacts DROP COLUMN notes").await?;
            Ok::<(), BoxError>(())
        })
}

#[tokio::test]
async fn test_generated_migration_shape_runs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("20240101000000-add_notes.rs"), "").unwrap();

    let settings = MigrationSettings::new(dir.path())
        .with_registry(MigrationRegistry::new().with("20240101000000-add_notes", add_notes()));
    let config = ServiceConfig::new().with_adapter(
        "main",
        RelationalConfig::new(Arc::new(SqliteClient::new()), MEMORY_TARGET)
            .with_model(
                "Contact",
                ModelDefinition::table(TableDefinition::new("contacts").column("email", "TEXT")),
            )
            .with_migrations(settings),
    );
    let service = DbService::new(config).unwrap();

    service.connect().await.unwrap();
    service.sync_db(&SyncOptions::default()).await.unwrap();

    let reports = service.migrate_all().await.unwrap();
    assert_eq!(reports["main"].applied, vec!["20240101000000-add_notes.rs"]);

    let conn = service.relational("main").unwrap().connection().unwrap();
    conn.execute("INSERT INTO contacts (email, notes) VALUES ('a@b.c', 'vip')")
        .await
        .unwrap();

    service.close_connection().await.unwrap();
    assert!(!service.is_connected().await);
}

#[test]
fn test_builtin_drivers_are_reexported() {
    let drivers = polydb::drivers::builtin();
    assert!(drivers.relational.is_some());
}
