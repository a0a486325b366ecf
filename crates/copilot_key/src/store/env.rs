use std::collections::HashMap;
use std::sync::RwLock;

use super::{validate_name, validate_value, CredentialRecord, CredentialStore};
use crate::error::StoreError;

/// Environment-backed store. Values are snapshotted at construction; writes
/// only update this process's view, the invoking shell persists them by
/// evaluating the emitted `export` line.
#[derive(Debug, Default)]
pub struct EnvStore {
    values: RwLock<HashMap<String, String>>,
}

impl EnvStore {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    /// Snapshot of the named variables from the process environment.
    pub fn from_process_env<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let values = names
            .into_iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self::new(values)
    }
}

impl CredentialStore for EnvStore {
    fn read(&self, name: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .and_then(CredentialRecord::from_value))
    }

    fn write(&self, name: &str, value: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        validate_value(name, value)?;
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "process environment".to_string()
    }
}
