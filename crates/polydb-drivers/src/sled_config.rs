//! sled configuration shared by the document and key-value stores.

use polydb_core::ConnectOptions;

/// Default cache capacity (64 MiB).
const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

/// sled settings read from a connection target and its option bag.
///
/// Recognised options:
/// - `temporary` (bool): throwaway database, removed on drop
/// - `cache_capacity` (u64): page cache size in bytes
/// - `compression` (bool): zstd compression, default on
/// - `flush_every_ms` (u64): background flush interval
#[derive(Debug, Clone, PartialEq)]
pub struct SledSettings {
    /// Database directory.
    pub path: String,
    /// Use a temporary database.
    pub temporary: bool,
    /// Page cache size in bytes.
    pub cache_capacity: u64,
    /// Enable compression.
    pub compression: bool,
    /// Background flush interval.
    pub flush_every_ms: Option<u64>,
}

impl SledSettings {
    /// Settings for `target` with `options` applied.
    pub fn from_options(target: &str, options: &ConnectOptions) -> Self {
        Self {
            path: target.to_string(),
            temporary: options.get_bool("temporary").unwrap_or(false),
            cache_capacity: options
                .get_u64("cache_capacity")
                .unwrap_or(DEFAULT_CACHE_CAPACITY),
            compression: options.get_bool("compression").unwrap_or(true),
            flush_every_ms: options.get_u64("flush_every_ms"),
        }
    }

    /// Convert to a sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        if let Some(ms) = self.flush_every_ms {
            config = config.flush_every_ms(Some(ms));
        }

        config
    }
}
