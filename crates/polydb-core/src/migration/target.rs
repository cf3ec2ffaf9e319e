//! Connections a migration engine can be bound to.

use async_trait::async_trait;

use super::ledger::LedgerStore;
use crate::backend::{DocumentConnection, ReadyState, RelationalConnection};
use crate::config::BackendKind;
use crate::error::BackendError;

/// A connection that keeps a migration ledger.
#[async_trait]
pub trait MigrationTarget: LedgerStore + 'static {
    /// Backend kind, used in log lines and errors.
    const KIND: BackendKind;

    /// Type name migration procedures receive, used in generated skeletons.
    const CONNECTION_TYPE: &'static str;

    /// Check that the connection is usable before touching the ledger.
    async fn verify(&self) -> Result<(), BackendError>;
}

#[async_trait]
impl MigrationTarget for dyn DocumentConnection {
    const KIND: BackendKind = BackendKind::Document;
    const CONNECTION_TYPE: &'static str = "DocumentConnection";

    async fn verify(&self) -> Result<(), BackendError> {
        match self.ready_state() {
            ReadyState::Connected => Ok(()),
            ReadyState::Disconnected | ReadyState::Disconnecting => Err(BackendError::Closed),
            ReadyState::Connecting => Err(BackendError::InvalidArgument(
                "document connection is still connecting".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MigrationTarget for dyn RelationalConnection {
    const KIND: BackendKind = BackendKind::Relational;
    const CONNECTION_TYPE: &'static str = "RelationalConnection";

    async fn verify(&self) -> Result<(), BackendError> {
        self.authenticate().await
    }
}
