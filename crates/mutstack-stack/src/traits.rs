//! The [`HistoryStore`] trait defining where a document's history lives.

use async_trait::async_trait;

use crate::entry::StackEntry;
use crate::error::StoreError;

/// Persistence boundary for a single document's mutation history.
///
/// The history is kept as a flag under `namespace`. Implementations should
/// refuse to store an empty list: callers clear the flag instead.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Read the persisted history. `Ok(None)` means no history exists.
    async fn history(&self, namespace: &str) -> Result<Option<Vec<StackEntry>>, StoreError>;

    /// Replace the persisted history.
    async fn set_history(&self, namespace: &str, entries: &[StackEntry]) -> Result<(), StoreError>;

    /// Remove the history flag entirely.
    async fn unset_history(&self, namespace: &str) -> Result<(), StoreError>;
}
