//! Collaborator boundaries the engine drives.
//!
//! The engine never fetches, persists or transports anything itself. Hosts
//! implement these traits; [`crate::memory`] has in-memory versions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mutstack_delta::Delta;
use mutstack_stack::{HistoryStore, StackEntry, StoreError};
use mutstack_types::{DocumentUuid, MutationId};

use crate::mutation::EmbeddedUpdate;

/// Options passed through untouched to [`Document::update`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateOptions(Map<String, Value>);

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Replacement history to store alongside a field update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryWrite {
    pub namespace: String,
    /// An empty list clears the flag.
    pub entries: Vec<StackEntry>,
}

impl HistoryWrite {
    /// Whether this write removes the history flag instead of setting it.
    pub fn clears(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the history on its own, for updates that touch no fields.
    pub async fn persist<S>(&self, store: &S) -> Result<(), StoreError>
    where
        S: HistoryStore + ?Sized,
    {
        if self.clears() {
            store.unset_history(&self.namespace).await
        } else {
            store.set_history(&self.namespace, &self.entries).await
        }
    }
}

/// One top-level write to a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub fields: Delta,
    pub history: Option<HistoryWrite>,
}

impl DocumentUpdate {
    /// Returns `true` when there is nothing to persist.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.history.is_none()
    }
}

/// A document mutations are applied to.
#[async_trait]
pub trait Document: HistoryStore {
    fn uuid(&self) -> &DocumentUuid;

    /// Whether the acting party currently owns the document.
    fn is_owner(&self) -> bool;

    /// Current field data, excluding history.
    async fn snapshot(&self) -> Result<Map<String, Value>, StoreError>;

    /// Persist fields and, when present, the replacement history together.
    /// Either both land or neither does.
    async fn update(&self, update: &DocumentUpdate, options: &UpdateOptions) -> Result<(), StoreError>;
}

/// Turns embedded-collection shorthand into concrete create, update and
/// delete operations against the live collection.
#[async_trait]
pub trait EmbeddedResolver: Send + Sync {
    /// Perform the update and return the inverse shorthand that undoes it.
    async fn perform(
        &self,
        document: &dyn Document,
        collection: &str,
        update: &EmbeddedUpdate,
    ) -> Result<Delta, StoreError>;
}

/// Resolves document uuids held by links.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, uuid: &DocumentUuid) -> Result<Arc<dyn Document>, StoreError>;
}

/// Acknowledgement of a revert handed to a party that owns the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResult {
    pub document: DocumentUuid,
    pub mutation_id: MutationId,
    pub acknowledged: bool,
}

/// Hands a revert to a party with write permission on the document.
#[async_trait]
pub trait RemoteReverter: Send + Sync {
    async fn request_revert(
        &self,
        document: &DocumentUuid,
        mutation_id: MutationId,
    ) -> Result<RemoteResult, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_options_builder() {
        let options = UpdateOptions::new().with("diff", json!(false));
        assert_eq!(options.get("diff"), Some(&json!(false)));
        assert!(UpdateOptions::new().is_empty());
        assert_eq!(serde_json::to_value(&options).unwrap(), json!({"diff": false}));
    }

    #[test]
    fn empty_update_detection() {
        assert!(DocumentUpdate::default().is_empty());
        let with_history = DocumentUpdate {
            fields: Delta::new(),
            history: Some(HistoryWrite {
                namespace: "ns".into(),
                entries: Vec::new(),
            }),
        };
        assert!(!with_history.is_empty());
        assert!(with_history.history.as_ref().is_some_and(HistoryWrite::clears));
    }

    #[tokio::test]
    async fn history_write_sets_or_clears() {
        let store = mutstack_stack::InMemoryHistory::new();
        let entry = StackEntry::new(Default::default(), Delta::new());
        let write = HistoryWrite {
            namespace: "ns".into(),
            entries: vec![entry.clone()],
        };
        write.persist(&store).await.unwrap();
        assert_eq!(store.history("ns").await.unwrap(), Some(vec![entry]));

        let clear = HistoryWrite {
            namespace: "ns".into(),
            entries: Vec::new(),
        };
        clear.persist(&store).await.unwrap();
        assert_eq!(store.history("ns").await.unwrap(), None);
    }
}
