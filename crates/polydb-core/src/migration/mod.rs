//! File-based migrations.
//!
//! Each adapter configured with a migrations directory gets a
//! [`MigrationEngine`] bound to its live connection once it connects. The
//! engine:
//! - generates timestamped skeleton files (`generate_migration`, `init`)
//! - pairs discovered files with procedures from a [`MigrationRegistry`]
//! - applies pending files in file name order and records them in the
//!   backend's [`LedgerStore`]
//!
//! # Example
//!
//! ```ignore
//! use polydb_core::migration::{Migration, MigrationRegistry, MigrationSettings};
//! use polydb_core::RelationalConnection;
//!
//! let registry = MigrationRegistry::<dyn RelationalConnection>::new().with(
//!     "20240101000000-first",
//!     Migration::new()
//!         .up(|db| async move { db.execute("CREATE TABLE t (id INTEGER)").await.map_err(Into::into) })
//!         .down(|db| async move { db.execute("DROP TABLE t").await.map_err(Into::into) }),
//! );
//! let settings = MigrationSettings::new("migrations").with_registry(registry);
//! ```

pub mod engine;
pub mod error;
pub mod ledger;
pub mod naming;
pub mod registry;
pub mod target;

pub use engine::{
    EngineState, MigrationEngine, MigrationReport, MigrationSettings, MigrationStatusEntry,
};
pub use error::MigrationError;
pub use ledger::{LedgerStore, MigrationRecord};
pub use registry::{Migration, MigrationFn, MigrationRegistry};
pub use target::MigrationTarget;
