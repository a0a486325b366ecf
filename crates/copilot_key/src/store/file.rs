use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use super::{validate_name, validate_value, CredentialRecord, CredentialStore};
use crate::error::StoreError;

pub const KEYS_FILE_NAME: &str = "keys";

/// `NAME='value'` lines shared with other processes through a runtime directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<runtime_dir>/<namespace>/keys`
    pub fn in_runtime_dir(runtime_dir: &Path, namespace: &str) -> Self {
        Self::new(runtime_dir.join(namespace).join(KEYS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_contents(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn ensure_parent(&self) -> Result<&Path, StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            create_private_dir(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        Ok(parent)
    }
}

impl CredentialStore for FileStore {
    fn read(&self, name: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let Some(content) = self.read_contents()? else {
            return Ok(None);
        };
        Ok(find_value(&content, name).and_then(CredentialRecord::from_value))
    }

    fn write(&self, name: &str, value: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        validate_value(name, value)?;
        let parent = self.ensure_parent()?;
        let existing = self.read_contents()?.unwrap_or_default();
        let merged = upsert_line(&existing, name, value);

        // Readers only ever see the old or the new file, never a partial line.
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
        restrict_permissions(tmp.path()).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.write_all(merged.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        restrict_permissions(&self.path).map_err(|e| StoreError::io(&self.path, e))?;

        debug!("Updated {} in {}", name, self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Value of the first `name=` line, with surrounding quotes removed.
fn find_value<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix('='))
        .map(|raw| unquote(raw.trim()))
}

fn unquote(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Replaces the line for `name` in place (dropping duplicates) or appends it.
fn upsert_line(existing: &str, name: &str, value: &str) -> String {
    let prefix = format!("{name}=");
    let entry = format!("{name}='{value}'");
    let mut replaced = false;
    let mut lines = Vec::new();

    for line in existing.lines() {
        if line.starts_with(&prefix) {
            if !replaced {
                lines.push(entry.clone());
                replaced = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }
    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(unix)]
pub(crate) fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
pub(crate) fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
