//! Key-value store adapter.
//!
//! Besides the lifecycle contract the adapter exposes a small command
//! surface. Every command is written to the transaction logger before it is
//! issued; failures come back as [`Error::Command`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::slot::ConnectionSlot;
use super::Adapter;
use crate::backend::{ConnectOptions, KeyTtl, KeyValueClient, KeyValueConnection};
use crate::config::{BackendKind, KeyValueConfig};
use crate::error::{BackendError, Error, Result};
use crate::logger::{default_logger, SharedLogger};

const KIND: BackendKind = BackendKind::KeyValue;

/// Adapter over a key-value store.
pub struct KeyValueAdapter {
    name: String,
    client: Arc<KeyValueClient>,
    target: String,
    options: ConnectOptions,
    logger: SharedLogger,
    transaction_logger: SharedLogger,
    slot: ConnectionSlot<dyn KeyValueConnection>,
}

impl KeyValueAdapter {
    /// Create a disconnected adapter.
    pub fn new(name: impl Into<String>, config: KeyValueConfig) -> Self {
        let name = name.into();
        let logger = config.logger.unwrap_or_else(|| default_logger(&name));
        let transaction_logger = config
            .transaction_logger
            .unwrap_or_else(|| Arc::clone(&logger));
        Self {
            client: config.client,
            target: config.connection_target,
            options: config.options,
            logger,
            transaction_logger,
            slot: ConnectionSlot::new(KIND),
            name,
        }
    }

    /// The open connection, if any.
    pub fn connection(&self) -> Option<Arc<dyn KeyValueConnection>> {
        self.slot.current()
    }

    fn fail(&self, err: Error) -> Error {
        self.logger.error(&err.to_string());
        err
    }

    async fn command<T, F, Fut>(&self, command: String, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn KeyValueConnection>) -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let conn = self.slot.require().map_err(|e| self.fail(e))?;
        self.transaction_logger.log(&command);
        f(conn).await.map_err(|source| {
            self.fail(Error::Command {
                kind: KIND,
                command,
                source,
            })
        })
    }

    /// Round-trip a ping.
    pub async fn ping(&self) -> Result<String> {
        self.command("ping".to_string(), |c| async move { c.ping().await })
            .await
    }

    /// Value at `key`.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.command(format!("get {key}"), |c| async move { c.get(key).await })
            .await
    }

    /// Store `value` at `key`, optionally expiring after `ttl`.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = value.into();
        let command = match ttl {
            Some(ttl) => format!("set {key} ({} bytes, ttl {}s)", value.len(), ttl.as_secs()),
            None => format!("set {key} ({} bytes)", value.len()),
        };
        self.command(command, |c| async move { c.set(key, value, ttl).await })
            .await
    }

    /// Keys matching a glob pattern.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.command(format!("keys {pattern}"), |c| async move {
            c.keys(pattern).await
        })
        .await
    }

    /// Delete `key`. Returns whether it existed.
    pub async fn del(&self, key: &str) -> Result<bool> {
        self.command(format!("del {key}"), |c| async move { c.del(key).await })
            .await
    }

    /// Expire `key` after `ttl`. Returns `false` when the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.command(format!("expire {key} {}s", ttl.as_secs()), |c| async move {
            c.expire(key, ttl).await
        })
        .await
    }

    /// Remaining lifetime of `key`.
    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.command(format!("ttl {key}"), |c| async move { c.ttl(key).await })
            .await
    }

    /// Set a hash field. Returns `true` when the field is new.
    pub async fn hset(&self, key: &str, field: &str, value: impl Into<Bytes>) -> Result<bool> {
        let value = value.into();
        self.command(format!("hset {key} {field}"), |c| async move {
            c.hset(key, field, value).await
        })
        .await
    }

    /// Value of a hash field.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        self.command(format!("hget {key} {field}"), |c| async move {
            c.hget(key, field).await
        })
        .await
    }

    /// Every field of a hash.
    pub async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, Bytes>> {
        self.command(format!("hgetall {key}"), |c| async move {
            c.hgetall(key).await
        })
        .await
    }
}

#[async_trait]
impl Adapter for KeyValueAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let _guard = self.slot.lock().await;
        if let Some(conn) = self.slot.current() {
            self.logger
                .log(&format!("Already connected to {}", conn.describe()));
            return Ok(());
        }

        let conn = self
            .client
            .open(&self.target, &self.options)
            .await
            .map_err(|source| self.fail(Error::Connection { kind: KIND, source }))?;
        if let Err(source) = conn.ping().await {
            if let Err(e) = conn.close().await {
                tracing::warn!(adapter = %self.name, error = %e, "failed to close unresponsive connection");
            }
            return Err(self.fail(Error::Connection { kind: KIND, source }));
        }

        self.slot.set(Arc::clone(&conn));
        self.logger
            .log(&format!("Successfully connected to {}", conn.describe()));
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let Some(conn) = self.slot.current() else {
            return false;
        };
        match conn.probe().await {
            Ok(alive) => alive,
            Err(e) => {
                tracing::debug!(adapter = %self.name, error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn close_connection(&self) -> Result<()> {
        let _guard = self.slot.lock().await;
        let Some(conn) = self.slot.current() else {
            self.logger.log("No open connection to close");
            return Ok(());
        };

        conn.close()
            .await
            .map_err(|source| self.fail(Error::Close { kind: KIND, source }))?;
        self.slot.clear();
        self.logger
            .log(&format!("Disconnected from {}", conn.describe()));
        Ok(())
    }

    async fn setup_models(&self) -> Result<()> {
        Ok(())
    }
}
