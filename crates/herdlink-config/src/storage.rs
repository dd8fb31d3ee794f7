// ── File-backed key-value storage ──
//
// Flat `key = "value"` TOML table on disk. Every write is a full
// read-modify-write through a sibling temp file and a rename, so a crash
// never leaves a half-written state file behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use herdlink_core::{KeyValueStore, StorageError};

/// Durable [`KeyValueStore`] backed by a single TOML file.
#[derive(Debug)]
pub struct FilePreferenceStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePreferenceStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Storage at the platform state path.
    pub fn open_default() -> Self {
        Self::new(crate::state_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(io_error(&self.path, &e)),
        };
        toml::from_str(&raw)
            .map_err(|e| StorageError(format!("corrupt state file {}: {e}", self.path.display())))
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }
        let rendered = toml::to_string_pretty(entries)
            .map_err(|e| StorageError(format!("failed to encode state: {e}")))?;

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, rendered).map_err(|e| io_error(&tmp, &e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, &e))
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read()?;
        if apply(&mut entries) {
            self.write(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FilePreferenceStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.read() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                tracing::warn!(error = %e, "state file unreadable; treating as empty");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError(format!("{}: {err}", path.display()))
}
