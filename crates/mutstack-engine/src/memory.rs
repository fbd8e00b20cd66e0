//! In-memory collaborators for testing and ephemeral use.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use mutstack_delta::{apply_to, restore_for, Delta, DeltaNode};
use mutstack_stack::{HistoryStore, InMemoryHistory, StackEntry, StoreError};
use mutstack_types::{DocumentUuid, MutationId};

use crate::mutation::EmbeddedUpdate;
use crate::traits::{
    Document, DocumentUpdate, EmbeddedResolver, IdentityResolver, RemoteResult, RemoteReverter,
    UpdateOptions,
};

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(format!("lock poisoned: {e}"))
}

// ---------------------------------------------------------------------------
// InMemoryDocument
// ---------------------------------------------------------------------------

/// A document held entirely in memory.
#[derive(Debug)]
pub struct InMemoryDocument {
    uuid: DocumentUuid,
    owner: AtomicBool,
    failing: AtomicBool,
    history_failing: AtomicBool,
    writes: AtomicUsize,
    data: RwLock<Map<String, Value>>,
    history: InMemoryHistory,
}

impl InMemoryDocument {
    pub fn new(uuid: DocumentUuid, data: Map<String, Value>) -> Self {
        Self {
            uuid,
            owner: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            history_failing: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            data: RwLock::new(data),
            history: InMemoryHistory::new(),
        }
    }

    /// A document from a JSON object; anything else starts empty.
    pub fn from_json(uuid: DocumentUuid, data: Value) -> Self {
        match data {
            Value::Object(map) => Self::new(uuid, map),
            _ => Self::new(uuid, Map::new()),
        }
    }

    pub fn set_owner(&self, owner: bool) {
        self.owner.store(owner, Ordering::SeqCst);
    }

    /// Make every subsequent [`Document::update`] fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent history write fail, including one carried by
    /// an update. Field-only updates still succeed.
    pub fn set_history_failing(&self, failing: bool) {
        self.history_failing.store(failing, Ordering::SeqCst);
    }

    fn check_history_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) || self.history_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("history of {} is failing", self.uuid)));
        }
        Ok(())
    }

    /// Number of top-level writes performed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn data(&self) -> Map<String, Value> {
        self.data.read().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn stored_history(&self, namespace: &str) -> Option<Vec<StackEntry>> {
        self.history.snapshot(namespace).ok().flatten()
    }
}

#[async_trait]
impl HistoryStore for InMemoryDocument {
    async fn history(&self, namespace: &str) -> Result<Option<Vec<StackEntry>>, StoreError> {
        self.history.snapshot(namespace)
    }

    async fn set_history(&self, namespace: &str, entries: &[StackEntry]) -> Result<(), StoreError> {
        self.check_history_writable()?;
        self.history.store(namespace, entries)
    }

    async fn unset_history(&self, namespace: &str) -> Result<(), StoreError> {
        self.check_history_writable()?;
        self.history.clear(namespace)
    }
}

#[async_trait]
impl Document for InMemoryDocument {
    fn uuid(&self) -> &DocumentUuid {
        &self.uuid
    }

    fn is_owner(&self) -> bool {
        self.owner.load(Ordering::SeqCst)
    }

    async fn snapshot(&self) -> Result<Map<String, Value>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.clone())
    }

    async fn update(&self, update: &DocumentUpdate, _options: &UpdateOptions) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} is failing", self.uuid)));
        }
        let mut data = self.data.write().map_err(poisoned)?;
        if let Some(history) = &update.history {
            self.check_history_writable()?;
            if history.clears() {
                self.history.clear(&history.namespace)?;
            } else {
                self.history.store(&history.namespace, &history.entries)?;
            }
        }
        apply_to(&mut data, &update.fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryEmbeddedStore
// ---------------------------------------------------------------------------

/// Items of one embedded collection, keyed by comparison value.
pub type Collection = BTreeMap<String, Map<String, Value>>;

/// Embedded collections of any number of documents, items keyed by their
/// comparison value.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddedStore {
    collections: RwLock<HashMap<(DocumentUuid, String), Collection>>,
}

impl InMemoryEmbeddedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item directly, bypassing history.
    pub fn seed(
        &self,
        document: &DocumentUuid,
        collection: &str,
        key: impl Into<String>,
        item: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        collections
            .entry((document.clone(), collection.to_string()))
            .or_default()
            .insert(key.into(), item);
        Ok(())
    }

    pub fn item(&self, document: &DocumentUuid, collection: &str, key: &str) -> Option<Map<String, Value>> {
        let collections = self.collections.read().ok()?;
        collections
            .get(&(document.clone(), collection.to_string()))?
            .get(key)
            .cloned()
    }

    /// Item keys of a collection, sorted.
    pub fn keys(&self, document: &DocumentUuid, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .ok()
            .and_then(|c| {
                c.get(&(document.clone(), collection.to_string()))
                    .map(|items| items.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    /// Every collection held for `document`, by name.
    pub fn export(&self, document: &DocumentUuid) -> BTreeMap<String, Collection> {
        self.collections
            .read()
            .map(|c| {
                c.iter()
                    .filter(|((doc, _), _)| doc == document)
                    .map(|((_, name), items)| (name.clone(), items.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddedResolver for InMemoryEmbeddedStore {
    async fn perform(
        &self,
        document: &dyn Document,
        collection: &str,
        update: &EmbeddedUpdate,
    ) -> Result<Delta, StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let items = collections
            .entry((document.uuid().clone(), collection.to_string()))
            .or_default();

        let mut inverse = Delta::new();
        for (key, node) in &update.shorthand {
            match node {
                DeltaNode::Delete => {
                    if let Some(removed) = items.remove(key) {
                        inverse.insert(key.clone(), DeltaNode::Replace(Value::Object(removed)));
                    }
                }
                DeltaNode::Replace(Value::Object(item)) => {
                    let previous = items.insert(key.clone(), item.clone());
                    let restore = match previous {
                        Some(previous) if previous == *item => continue,
                        Some(previous) => DeltaNode::Replace(Value::Object(previous)),
                        None => DeltaNode::Delete,
                    };
                    inverse.insert(key.clone(), restore);
                }
                DeltaNode::Nested(changes) => match items.get_mut(key) {
                    Some(item) => {
                        let restore = restore_for(item, changes);
                        apply_to(item, changes);
                        if !restore.is_empty() {
                            inverse.insert(key.clone(), DeltaNode::Nested(restore));
                        }
                    }
                    None => {
                        let mut item = Map::new();
                        item.insert(update.comparison_key.clone(), Value::String(key.clone()));
                        apply_to(&mut item, changes);
                        items.insert(key.clone(), item);
                        inverse.insert(key.clone(), DeltaNode::Delete);
                    }
                },
                DeltaNode::Value(_) | DeltaNode::Replace(_) => {
                    return Err(StoreError::Rejected(format!(
                        "embedded item {key:?} in {collection} must be an object or a deletion"
                    )));
                }
            }
        }
        Ok(inverse)
    }
}

// ---------------------------------------------------------------------------
// DocumentDirectory
// ---------------------------------------------------------------------------

/// Resolves document uuids against a fixed set of documents.
#[derive(Default)]
pub struct DocumentDirectory {
    documents: RwLock<HashMap<DocumentUuid, Arc<dyn Document>>>,
}

impl DocumentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Arc<dyn Document>) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(document.uuid().clone(), document);
        }
    }
}

#[async_trait]
impl IdentityResolver for DocumentDirectory {
    async fn resolve(&self, uuid: &DocumentUuid) -> Result<Arc<dyn Document>, StoreError> {
        let documents = self.documents.read().map_err(poisoned)?;
        documents
            .get(uuid)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(uuid.clone()))
    }
}

// ---------------------------------------------------------------------------
// RecordingRemote
// ---------------------------------------------------------------------------

/// A remote reverter that acknowledges and records every request.
#[derive(Debug, Default)]
pub struct RecordingRemote {
    requests: RwLock<Vec<(DocumentUuid, MutationId)>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(DocumentUuid, MutationId)> {
        self.requests.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteReverter for RecordingRemote {
    async fn request_revert(
        &self,
        document: &DocumentUuid,
        mutation_id: MutationId,
    ) -> Result<RemoteResult, StoreError> {
        let mut requests = self.requests.write().map_err(poisoned)?;
        requests.push((document.clone(), mutation_id));
        Ok(RemoteResult {
            document: document.clone(),
            mutation_id,
            acknowledged: true,
        })
    }
}
