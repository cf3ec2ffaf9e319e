//! Key-value store capabilities.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::Connection;
use crate::error::BackendError;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// The key expires after this duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Whether the key exists.
    pub fn exists(&self) -> bool {
        !matches!(self, KeyTtl::Missing)
    }
}

/// Capabilities of an open key-value store connection.
#[async_trait]
pub trait KeyValueConnection: Connection {
    /// Round-trip a ping, returning the server reply.
    async fn ping(&self) -> Result<String, BackendError>;

    /// Value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    /// Store `value` at `key`, replacing any previous value and lifetime.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>)
        -> Result<(), BackendError>;

    /// Keys matching a glob `pattern` (`*`, `?`, `[..]`), sorted.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError>;

    /// Delete `key`. Returns whether something was removed.
    async fn del(&self, key: &str) -> Result<bool, BackendError>;

    /// Set a lifetime on an existing key. Returns `false` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

    /// Remaining lifetime of `key`.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError>;

    /// Set a hash field. Returns `true` when the field is new.
    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<bool, BackendError>;

    /// Value of a hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>, BackendError>;

    /// Every field of a hash; empty when the key is absent.
    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, Bytes>, BackendError>;
}
