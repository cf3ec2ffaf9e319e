use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::BackendKind;
use crate::error::{Error, Result};

/// Holds an adapter's connection, zero or one at a time.
///
/// `connect` and `close_connection` hold the lifecycle lock for their whole
/// duration so two concurrent `connect` calls open a single connection.
pub(crate) struct ConnectionSlot<H: ?Sized> {
    kind: BackendKind,
    lifecycle: Mutex<()>,
    connection: RwLock<Option<Arc<H>>>,
}

impl<H: ?Sized> ConnectionSlot<H> {
    pub(crate) fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            lifecycle: Mutex::new(()),
            connection: RwLock::new(None),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    pub(crate) fn current(&self) -> Option<Arc<H>> {
        self.connection.read().clone()
    }

    pub(crate) fn require(&self) -> Result<Arc<H>> {
        self.current()
            .ok_or(Error::NotConnected { kind: self.kind })
    }

    pub(crate) fn set(&self, connection: Arc<H>) {
        *self.connection.write() = Some(connection);
    }

    pub(crate) fn clear(&self) {
        *self.connection.write() = None;
    }
}
