//! Bounded local backup of consultations.
//!
//! The backup is a JSON array stored under a single namespaced key, newest
//! first. It is the only mutable state the client shares between operations:
//! every write goes through [`LocalBackup::record`] and every read through
//! [`LocalBackup::entries`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use audit_chain::LedgerRecord;

use crate::error::{AgentError, Result};
use crate::reconcile::SourcedRecord;

/// Default namespace key.
pub const DEFAULT_NAMESPACE_KEY: &str = "oracle.audit.backup.v1";

/// Default maximum number of retained entries.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Synchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value; returns once it is durable.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `directory`; the directory is created on first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Get the root directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.directory.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        // Rename is atomic on the same filesystem; readers never see a partial file
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// Bounded, newest-first backup of consultation records.
pub struct LocalBackup {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_entries: usize,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl LocalBackup {
    /// Create a backup over a store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: DEFAULT_NAMESPACE_KEY.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            write_lock: Mutex::new(()),
        }
    }

    /// Set the namespace key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the retention bound (at least 1).
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Get the namespace key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the retention bound.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Back up a consultation.
    ///
    /// Prepends the record, drops any older copy of the same hash, truncates
    /// to the bound and persists before returning. Returns the entry count.
    pub fn record(&self, record: &LedgerRecord) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Unreadable backup replaced");
                Vec::new()
            }
        };

        entries.retain(|e| e.record.hash != record.hash);
        entries.insert(0, SourcedRecord::local(record.clone()));
        entries.truncate(self.max_entries);

        let json = serde_json::to_string(&entries).map_err(|e| AgentError::Storage(e.to_string()))?;
        self.store.set(&self.key, &json)?;

        debug!(hash = %record.hash, entries = entries.len(), "Backed up consultation");
        Ok(entries.len())
    }

    /// Read all entries, newest first.
    ///
    /// An unreadable backup reads as empty; it is never allowed to block a load.
    pub fn entries(&self) -> Vec<SourcedRecord> {
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Ignoring unreadable backup");
                Vec::new()
            }
        }
    }

    /// Delete every entry.
    pub fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store.remove(&self.key)?;
        info!(key = %self.key, "Local backup reset");
        Ok(())
    }

    fn load(&self) -> Result<Vec<SourcedRecord>> {
        let Some(json) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<SourcedRecord> =
            serde_json::from_str(&json).map_err(|e| AgentError::Storage(e.to_string()))?;
        for entry in &mut entries {
            entry.from_local_backup = true;
        }
        Ok(entries)
    }
}
