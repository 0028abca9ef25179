//! Non-blocking operation locks.
//!
//! A second request for an operation that is already in flight is turned
//! away immediately rather than queued. Locks are plain values owned by the
//! service; there is no global registry.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identity of an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKey {
    /// A consultation, keyed by session and question
    Ask(String),
    /// Verification of one hash
    Verify(String),
    /// Ledger reload
    LoadChain,
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ask(id) => write!(f, "ask_{id}"),
            Self::Verify(hash) => write!(f, "verify_{hash}"),
            Self::LoadChain => f.write_str("loadChain"),
        }
    }
}

/// Outcome of a guarded operation.
///
/// Contention is not an error: the caller simply learns the operation was
/// already running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Guarded<T> {
    /// The operation ran
    Completed(T),
    /// Another call holds the lock
    AlreadyRunning { key: String },
}

impl<T> Guarded<T> {
    /// Get the value if the operation ran.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::AlreadyRunning { .. } => None,
        }
    }

    /// Whether the call was turned away.
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }
}

/// Set of held operation keys.
#[derive(Debug, Default)]
pub struct OperationLocks {
    held: DashMap<String, Instant>,
}

impl OperationLocks {
    /// Create an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take a key. Returns false if it is already held.
    pub fn acquire(&self, key: &str) -> bool {
        match self.held.entry(key.to_string()) {
            Entry::Occupied(_) => {
                debug!(key = %key, "Operation already in flight");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }

    /// Release a key. Returns whether it was held.
    pub fn release(&self, key: &str) -> bool {
        self.held.remove(key).is_some()
    }

    /// Whether a key is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    /// How long a key has been held.
    pub fn held_for(&self, key: &str) -> Option<Duration> {
        self.held.get(key).map(|since| since.elapsed())
    }

    /// Number of held keys.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Take a key and release it when the guard drops.
    ///
    /// The guard releases on every exit path, including `?` and panics.
    pub fn try_guard(&self, key: &OperationKey) -> Option<OperationGuard<'_>> {
        let key = key.to_string();
        self.acquire(&key).then(|| OperationGuard { locks: self, key })
    }
}

/// Holds an operation key until dropped.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    locks: &'a OperationLocks,
    key: String,
}

impl OperationGuard<'_> {
    /// Get the held key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}
