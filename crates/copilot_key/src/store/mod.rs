//! Credential stores
//!
//! Two backends share one contract:
//! - [`FileStore`]: `NAME='value'` lines in `<runtime-dir>/<namespace>/keys`, mode 0600
//! - [`EnvStore`]: the value of an environment variable captured at startup
//!
//! A missing file, line, or expiry marker is a cache miss, not an error.

mod env;
mod file;

pub use env::EnvStore;
pub use file::FileStore;
pub(crate) use file::create_private_dir;

use crate::error::StoreError;
use crate::expiry::parse_expiry;

/// A cached credential and the expiry embedded in its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub value: String,
    pub expiry: i64,
}

impl CredentialRecord {
    /// Builds a record from a raw token, or `None` if it carries no expiry.
    pub fn from_value(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let expiry = parse_expiry(&value)?;
        Some(Self { value, expiry })
    }

    pub fn is_fresh_at(&self, now: i64, margin_secs: i64) -> bool {
        self.expiry > now.saturating_add(margin_secs)
    }

    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.expiry - now
    }
}

pub trait CredentialStore: Send + Sync {
    /// Returns the record for `name`, or `None` on a cold cache.
    fn read(&self, name: &str) -> Result<Option<CredentialRecord>, StoreError>;

    /// Replaces or appends `name`, leaving other entries untouched.
    fn write(&self, name: &str, value: &str) -> Result<(), StoreError>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;

    /// True iff a record exists and expires after `now + margin_secs`.
    /// Read failures count as "not fresh" so a broken cache forces a refresh.
    fn is_fresh(&self, name: &str, margin_secs: i64, now: i64) -> bool {
        match self.read(name) {
            Ok(Some(record)) => record.is_fresh_at(now, margin_secs),
            Ok(None) => false,
            Err(e) => {
                log::warn!("Error checking existing key in {}: {}", self.describe(), e);
                false
            }
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// True iff `value` fits inside `'...'` on a single line.
pub(crate) fn is_shell_safe(value: &str) -> bool {
    !value.chars().any(|c| c == '\'' || c.is_control())
}

pub(crate) fn validate_value(name: &str, value: &str) -> Result<(), StoreError> {
    if is_shell_safe(value) {
        Ok(())
    } else {
        Err(StoreError::UnsafeValue(name.to_string()))
    }
}
