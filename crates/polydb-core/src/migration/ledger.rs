//! Migration ledger: the persisted set of applied migrations.
//!
//! Each backend keeps its ledger in its own native storage (a collection or
//! a table named by [`BackendKind::ledger_name`](crate::BackendKind::ledger_name)),
//! so engines bound to different adapters never contend on it.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    /// Migration file name; unique within a ledger.
    pub migration_name: String,
    /// When the migration was recorded.
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Record `migration_name` as applied now.
    pub fn now(migration_name: impl Into<String>) -> Self {
        Self {
            migration_name: migration_name.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Backend-native storage for [`MigrationRecord`]s.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the ledger collection/table if it does not exist. Idempotent.
    async fn ensure_ledger(&self) -> Result<(), BackendError>;

    /// Every record, ordered by migration name.
    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, BackendError>;

    /// Append a record. Fails with [`BackendError::DuplicateRecord`] when the
    /// name is already present.
    async fn record_migration(&self, record: &MigrationRecord) -> Result<(), BackendError>;
}

/// Names of applied migrations.
pub fn applied_names(records: &[MigrationRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.migration_name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_camel_case() {
        let record = MigrationRecord::now("20240101000000-first.rs");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["migrationName"], "20240101000000-first.rs");
        assert!(json.get("appliedAt").is_some());

        let back: MigrationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_applied_names() {
        let records = vec![
            MigrationRecord::now("20200102-second.x"),
            MigrationRecord::now("20200101-first.x"),
        ];
        let names = applied_names(&records);
        assert!(names.contains("20200101-first.x"));
        assert_eq!(names.len(), 2);
    }
}
