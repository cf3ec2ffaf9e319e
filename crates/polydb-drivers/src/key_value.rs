//! Key-value backend on embedded sled.
//!
//! Layout:
//! - `kv:strings`: key -> value
//! - `kv:hashes`: key `\0` field -> value
//! - `kv:expiry`: key -> deadline in unix milliseconds (big-endian i64)
//!
//! A key holds either a string or a hash. Expired keys are purged lazily
//! when they are next touched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use polydb_core::{
    BackendClient, BackendError, ConnectOptions, Connection, KeyTtl, KeyValueConnection,
};
use sled::{Db, Tree};

use crate::error::DriverError;
use crate::sled_config::SledSettings;

const STRINGS_TREE: &str = "kv:strings";
const HASHES_TREE: &str = "kv:hashes";
const EXPIRY_TREE: &str = "kv:expiry";

/// Separator between a hash key and its field.
const FIELD_SEPARATOR: u8 = 0;

/// Opens sled key-value stores. The connection target is the database directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SledKeyValueClient;

impl SledKeyValueClient {
    /// Create a client.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendClient for SledKeyValueClient {
    type Handle = dyn KeyValueConnection;

    async fn open(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn KeyValueConnection>, BackendError> {
        let conn = SledKeyValueConnection::open(SledSettings::from_options(target, options)).await?;
        Ok(Arc::new(conn))
    }
}

struct Trees {
    db: Db,
    strings: Tree,
    hashes: Tree,
    expiry: Tree,
}

/// One open sled key-value store.
pub struct SledKeyValueConnection {
    settings: SledSettings,
    trees: RwLock<Option<Arc<Trees>>>,
}

impl SledKeyValueConnection {
    /// Open the store described by `settings`.
    pub async fn open(settings: SledSettings) -> Result<Self, BackendError> {
        let config = settings.to_sled_config();
        let trees = tokio::task::spawn_blocking(move || -> Result<Trees, DriverError> {
            let db = config.open()?;
            Ok(Trees {
                strings: db.open_tree(STRINGS_TREE)?,
                hashes: db.open_tree(HASHES_TREE)?,
                expiry: db.open_tree(EXPIRY_TREE)?,
                db,
            })
        })
        .await
        .map_err(DriverError::from)??;

        tracing::debug!(path = %settings.path, temporary = settings.temporary, "opened sled key-value store");
        Ok(Self {
            settings,
            trees: RwLock::new(Some(Arc::new(trees))),
        })
    }

    fn trees(&self) -> Result<Arc<Trees>, DriverError> {
        self.trees.read().clone().ok_or(DriverError::Closed)
    }

    /// Trees for a command on `key`, with `key` purged if it has expired.
    fn live(&self, key: &str) -> Result<Arc<Trees>, DriverError> {
        validate_key(key)?;
        let trees = self.trees()?;
        trees.purge_if_expired(key.as_bytes(), now_millis())?;
        Ok(trees)
    }
}

impl Trees {
    fn deadline(&self, key: &[u8]) -> Result<Option<i64>, DriverError> {
        match self.expiry.get(key)? {
            Some(raw) => decode_deadline(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Remove `key` if its deadline has passed. Returns whether it was purged.
    fn purge_if_expired(&self, key: &[u8], now: i64) -> Result<bool, DriverError> {
        match self.deadline(key)? {
            Some(deadline) if deadline <= now => {
                self.remove(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Remove `key` whatever its type. Returns whether it existed.
    fn remove(&self, key: &[u8]) -> Result<bool, DriverError> {
        let had_string = self.strings.remove(key)?.is_some();
        let mut had_hash = false;
        for entry in self.hashes.scan_prefix(field_prefix(key)) {
            let (field_key, _) = entry?;
            self.hashes.remove(field_key)?;
            had_hash = true;
        }
        self.expiry.remove(key)?;
        Ok(had_string || had_hash)
    }

    fn is_hash(&self, key: &[u8]) -> Result<bool, DriverError> {
        Ok(self.hashes.scan_prefix(field_prefix(key)).next().transpose()?.is_some())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, DriverError> {
        Ok(self.strings.contains_key(key)? || self.is_hash(key)?)
    }
}

#[async_trait]
impl Connection for SledKeyValueConnection {
    fn describe(&self) -> String {
        if self.settings.temporary {
            "sled-kv://(temporary)".to_string()
        } else {
            format!("sled-kv://{}", self.settings.path)
        }
    }

    async fn probe(&self) -> Result<bool, BackendError> {
        Ok(self.ping().await? == "PONG")
    }

    async fn close(&self) -> Result<(), BackendError> {
        let Some(trees) = self.trees.read().clone() else {
            return Ok(());
        };

        let db = trees.db.clone();
        tokio::task::spawn_blocking(move || db.flush())
            .await
            .map_err(DriverError::from)?
            .map_err(DriverError::from)?;

        self.trees.write().take();
        tracing::debug!(path = %self.settings.path, "closed sled key-value store");
        Ok(())
    }
}

#[async_trait]
impl KeyValueConnection for SledKeyValueConnection {
    async fn ping(&self) -> Result<String, BackendError> {
        self.trees()?;
        Ok("PONG".to_string())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        let trees = self.live(key)?;
        if trees.is_hash(key.as_bytes())? {
            return Err(wrong_type(key));
        }
        let value = trees.strings.get(key).map_err(DriverError::from)?;
        Ok(value.map(|v| Bytes::copy_from_slice(&v)))
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let trees = self.live(key)?;
        trees.remove(key.as_bytes())?;
        trees
            .strings
            .insert(key, value.as_ref())
            .map_err(DriverError::from)?;
        if let Some(ttl) = ttl {
            trees
                .expiry
                .insert(key, deadline_after(ttl)?.to_be_bytes().to_vec())
                .map_err(DriverError::from)?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| BackendError::InvalidArgument(format!("invalid key pattern: {e}")))?;
        let trees = self.trees()?;
        let now = now_millis();

        let mut candidates = BTreeSet::new();
        for entry in trees.strings.iter().keys() {
            candidates.insert(entry.map_err(DriverError::from)?.to_vec());
        }
        for entry in trees.hashes.iter().keys() {
            let raw = entry.map_err(DriverError::from)?;
            if let Some(end) = raw.iter().position(|b| *b == FIELD_SEPARATOR) {
                candidates.insert(raw[..end].to_vec());
            }
        }

        let mut keys = Vec::new();
        for raw in candidates {
            if trees.purge_if_expired(&raw, now)? {
                continue;
            }
            match String::from_utf8(raw) {
                Ok(key) if pattern.matches(&key) => keys.push(key),
                _ => {}
            }
        }
        Ok(keys)
    }

    async fn del(&self, key: &str) -> Result<bool, BackendError> {
        let trees = self.live(key)?;
        Ok(trees.remove(key.as_bytes())?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let trees = self.live(key)?;
        if !trees.exists(key.as_bytes())? {
            return Ok(false);
        }
        trees
            .expiry
            .insert(key, deadline_after(ttl)?.to_be_bytes().to_vec())
            .map_err(DriverError::from)?;
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError> {
        let trees = self.live(key)?;
        if !trees.exists(key.as_bytes())? {
            return Ok(KeyTtl::Missing);
        }
        match trees.deadline(key.as_bytes())? {
            Some(deadline) => {
                let remaining = deadline.saturating_sub(now_millis()).max(0);
                Ok(KeyTtl::Expires(Duration::from_millis(remaining as u64)))
            }
            None => Ok(KeyTtl::Persistent),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<bool, BackendError> {
        let trees = self.live(key)?;
        if trees.strings.contains_key(key).map_err(DriverError::from)? {
            return Err(wrong_type(key));
        }
        let previous = trees
            .hashes
            .insert(field_key(key.as_bytes(), field), value.as_ref())
            .map_err(DriverError::from)?;
        Ok(previous.is_none())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>, BackendError> {
        let trees = self.live(key)?;
        if trees.strings.contains_key(key).map_err(DriverError::from)? {
            return Err(wrong_type(key));
        }
        let value = trees
            .hashes
            .get(field_key(key.as_bytes(), field))
            .map_err(DriverError::from)?;
        Ok(value.map(|v| Bytes::copy_from_slice(&v)))
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, Bytes>, BackendError> {
        let trees = self.live(key)?;
        if trees.strings.contains_key(key).map_err(DriverError::from)? {
            return Err(wrong_type(key));
        }

        let prefix = field_prefix(key.as_bytes());
        let mut fields = BTreeMap::new();
        for entry in trees.hashes.scan_prefix(&prefix) {
            let (raw, value) = entry.map_err(DriverError::from)?;
            let field = String::from_utf8(raw[prefix.len()..].to_vec())
                .map_err(|e| DriverError::InvalidData(format!("hash field of {key}: {e}")))?;
            fields.insert(field, Bytes::copy_from_slice(&value));
        }
        Ok(fields)
    }
}

fn validate_key(key: &str) -> Result<(), DriverError> {
    if key.is_empty() || key.as_bytes().contains(&FIELD_SEPARATOR) {
        return Err(DriverError::InvalidArgument(format!(
            "invalid key {key:?}"
        )));
    }
    Ok(())
}

fn wrong_type(key: &str) -> BackendError {
    BackendError::InvalidArgument(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

fn field_prefix(key: &[u8]) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key);
    prefix.push(FIELD_SEPARATOR);
    prefix
}

fn field_key(key: &[u8], field: &str) -> Vec<u8> {
    let mut raw = field_prefix(key);
    raw.extend_from_slice(field.as_bytes());
    raw
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn deadline_after(ttl: Duration) -> Result<i64, DriverError> {
    let millis = i64::try_from(ttl.as_millis())
        .map_err(|_| DriverError::InvalidArgument(format!("ttl too large: {ttl:?}")))?;
    Ok(now_millis().saturating_add(millis))
}

fn decode_deadline(raw: &[u8]) -> Result<i64, DriverError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| DriverError::InvalidData(format!("expiry entry of {} bytes", raw.len())))?;
    Ok(i64::from_be_bytes(bytes))
}
