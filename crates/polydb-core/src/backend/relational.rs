//! Relational store capabilities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Connection, SyncOptions};
use crate::error::BackendError;
use crate::migration::LedgerStore;

/// A column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// SQL type and constraints, e.g. `TEXT NOT NULL`.
    #[serde(rename = "type")]
    pub sql_type: String,
}

/// Declarative table definition used by schema synchronisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub table: String,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl TableDefinition {
    /// Create a definition with no columns.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            sql_type: sql_type.into(),
        });
        self
    }

    /// Check that table and column names are plain identifiers.
    pub fn validate(&self) -> Result<(), BackendError> {
        if !is_identifier(&self.table) {
            return Err(BackendError::InvalidArgument(format!(
                "invalid table name {:?}",
                self.table
            )));
        }
        if let Some(column) = self.columns.iter().find(|c| !is_identifier(&c.name)) {
            return Err(BackendError::InvalidArgument(format!(
                "invalid column name {:?} in table {}",
                column.name, self.table
            )));
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this definition.
    pub fn create_statement(&self) -> String {
        let columns = if self.columns.is_empty() {
            "\"id\" INTEGER PRIMARY KEY".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| format!("\"{}\" {}", c.name, c.sql_type))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", self.table, columns)
    }

    /// `DROP TABLE IF EXISTS` statement for this definition.
    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\"", self.table)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Kind of association between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// This model holds the foreign key.
    BelongsTo,
    /// The target holds a foreign key to this model, at most one row.
    HasOne,
    /// The target holds a foreign key to this model.
    HasMany,
}

/// An association declared from one model to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Association kind.
    pub kind: AssociationKind,
    /// Target model name.
    pub target: String,
    /// Foreign key column.
    pub foreign_key: String,
}

/// Model handle bound to a relational connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalModel {
    name: String,
    definition: TableDefinition,
    associations: Vec<Association>,
}

impl RelationalModel {
    /// Create a model handle.
    pub fn new(name: impl Into<String>, definition: TableDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
            associations: Vec::new(),
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing table.
    pub fn table(&self) -> &str {
        &self.definition.table
    }

    /// Table definition.
    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    /// Declared associations.
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Declare that this model references `target` through `foreign_key`.
    pub fn belongs_to(&mut self, target: &RelationalModel, foreign_key: impl Into<String>) {
        self.associate(AssociationKind::BelongsTo, target, foreign_key);
    }

    /// Declare that `target` references this model, one row at most.
    pub fn has_one(&mut self, target: &RelationalModel, foreign_key: impl Into<String>) {
        self.associate(AssociationKind::HasOne, target, foreign_key);
    }

    /// Declare that `target` references this model.
    pub fn has_many(&mut self, target: &RelationalModel, foreign_key: impl Into<String>) {
        self.associate(AssociationKind::HasMany, target, foreign_key);
    }

    fn associate(
        &mut self,
        kind: AssociationKind,
        target: &RelationalModel,
        foreign_key: impl Into<String>,
    ) {
        self.associations.push(Association {
            kind,
            target: target.name.clone(),
            foreign_key: foreign_key.into(),
        });
    }
}

/// Capabilities of an open relational store connection.
#[async_trait]
pub trait RelationalConnection: Connection + LedgerStore {
    /// Re-authenticate against the server.
    async fn authenticate(&self) -> Result<(), BackendError>;

    /// Name of the connected database.
    fn database_name(&self) -> String;

    /// Define a model on this connection so that [`sync`](Self::sync) manages its table.
    fn define(
        &self,
        name: &str,
        definition: TableDefinition,
    ) -> Result<RelationalModel, BackendError>;

    /// Model defined under `name`.
    fn model(&self, name: &str) -> Option<RelationalModel>;

    /// Execute one or more SQL statements.
    async fn execute(&self, sql: &str) -> Result<(), BackendError>;

    /// Names of user tables, sorted.
    async fn table_names(&self) -> Result<Vec<String>, BackendError>;

    /// Create, recreate or alter tables of every defined model.
    async fn sync(&self, options: &SyncOptions) -> Result<(), BackendError>;
}
