//! In-memory history store for testing and ephemeral use.
//!
//! [`InMemoryHistory`] keeps one history list per namespace in a `HashMap`
//! protected by a `RwLock`. Like a real document flag store, it refuses to
//! persist an empty list.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::entry::StackEntry;
use crate::error::StoreError;
use crate::traits::HistoryStore;

/// An in-memory implementation of [`HistoryStore`].
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    flags: RwLock<HashMap<String, Vec<StackEntry>>>,
}

impl InMemoryHistory {
    /// Create a new empty history store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted entries, `None` when the flag is absent.
    pub fn history_len(&self, namespace: &str) -> Option<usize> {
        self.flags
            .read()
            .ok()
            .and_then(|flags| flags.get(namespace).map(Vec::len))
    }

    /// A synchronous copy of the persisted history.
    pub fn snapshot(&self, namespace: &str) -> Result<Option<Vec<StackEntry>>, StoreError> {
        let flags = self
            .flags
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(flags.get(namespace).cloned())
    }

    /// Replace the persisted history synchronously.
    pub fn store(&self, namespace: &str, entries: &[StackEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Err(StoreError::Rejected(format!(
                "empty history for namespace {namespace:?} must be unset, not stored"
            )));
        }
        let mut flags = self
            .flags
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        flags.insert(namespace.to_string(), entries.to_vec());
        Ok(())
    }

    /// Remove the persisted history synchronously.
    pub fn clear(&self, namespace: &str) -> Result<(), StoreError> {
        let mut flags = self
            .flags
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        flags.remove(namespace);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn history(&self, namespace: &str) -> Result<Option<Vec<StackEntry>>, StoreError> {
        self.snapshot(namespace)
    }

    async fn set_history(&self, namespace: &str, entries: &[StackEntry]) -> Result<(), StoreError> {
        self.store(namespace, entries)
    }

    async fn unset_history(&self, namespace: &str) -> Result<(), StoreError> {
        self.clear(namespace)
    }
}
