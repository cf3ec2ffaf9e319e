//! PolyDB - one service over document, relational and key-value backends.
//!
//! Re-exports [`polydb_core`] and, with the default `embedded` feature, the
//! SQLite and sled clients from `polydb-drivers`.
//!
//! ```no_run
//! use polydb::{DbService, ServiceManifest};
//!
//! # async fn run() -> polydb::Result<()> {
//! let manifest = ServiceManifest::from_path("polydb.json")?;
//! let service = DbService::from_manifest(&manifest, &polydb::drivers::builtin())?;
//! service.connect().await?;
//! service.sync_db(&polydb::SyncOptions::default()).await?;
//! service.close_connection().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Migration files generated by the engine import
//! `polydb::migration::Migration` and the connection trait from the crate
//! root.

pub use polydb_core::*;

/// Built-in backend clients.
#[cfg(feature = "embedded")]
pub mod drivers {
    pub use polydb_drivers::*;
}
