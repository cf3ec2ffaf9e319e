//! Migration file naming.
//!
//! Files are named `<timestamp>-<name>.<ext>` where the timestamp is the UTC
//! creation time with separators removed (`%Y%m%d%H%M%S`, always 14 digits),
//! so lexical order of file names is creation order.

use chrono::{DateTime, Utc};

use super::error::MigrationError;

/// Timestamp layout of the file name prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Default extension of migration files.
pub const DEFAULT_EXTENSION: &str = "rs";

/// Name of the migration seeded by `init`.
pub const SEED_MIGRATION: &str = "first";

/// Reject names that cannot be embedded in a file name.
pub fn validate_name(name: &str) -> Result<(), MigrationError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MigrationError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// File stem for a migration created at `at`.
pub fn migration_stem(at: DateTime<Utc>, name: &str) -> String {
    format!("{}-{}", at.format(TIMESTAMP_FORMAT), name)
}

/// File name for a migration created at `at`.
pub fn migration_file_name(at: DateTime<Utc>, name: &str, extension: &str) -> String {
    format!("{}.{}", migration_stem(at, name), extension)
}

/// Stem of `file_name` if it carries `extension`.
pub fn file_stem<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() || stem.starts_with('.') {
        None
    } else {
        Some(stem)
    }
}
