//! A document stored as one JSON file.
//!
//! ```json
//! {
//!   "uuid": "Actor.hero",
//!   "data": { "hp": 10 },
//!   "flags": { "mutstack": { "mutate": [] } },
//!   "embedded": { "items": { "Sword": { "name": "Sword" } } }
//! }
//! ```
//!
//! Changes are kept in memory until [`FileDocument::save`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mutstack_delta::apply_to;
use mutstack_engine::memory::{Collection, InMemoryEmbeddedStore};
use mutstack_engine::{Document, DocumentUpdate, UpdateOptions};
use mutstack_stack::{HistoryStore, StackEntry, StoreError, HISTORY_KEY};
use mutstack_types::DocumentUuid;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct DocumentFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    flags: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    embedded: BTreeMap<String, Collection>,
}

pub struct FileDocument {
    path: PathBuf,
    uuid: DocumentUuid,
    state: Mutex<DocumentFile>,
}

impl FileDocument {
    /// Open `path`. The uuid defaults to the file stem.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: DocumentFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;

        let uuid = match &file.uuid {
            Some(uuid) => uuid.clone(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let uuid = DocumentUuid::parse(uuid)?;

        Ok(Self {
            path: path.to_path_buf(),
            uuid,
            state: Mutex::new(file),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DocumentFile>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Load the file's embedded collections into `store`.
    pub fn seed_embedded(&self, store: &InMemoryEmbeddedStore) -> anyhow::Result<()> {
        let state = self.lock()?;
        for (collection, items) in &state.embedded {
            for (key, item) in items {
                store.seed(&self.uuid, collection, key.clone(), item.clone())?;
            }
        }
        Ok(())
    }

    /// Take the embedded collections back from `store`.
    pub fn absorb_embedded(&self, store: &InMemoryEmbeddedStore) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        state.embedded = store
            .export(&self.uuid)
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .collect();
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let rendered = {
            let state = self.lock()?;
            serde_json::to_string_pretty(&*state)?
        };
        std::fs::write(&self.path, rendered + "\n")
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileDocument {
    async fn history(&self, namespace: &str) -> Result<Option<Vec<StackEntry>>, StoreError> {
        let state = self.lock()?;
        let Some(raw) = state.flags.get(namespace).and_then(|scope| scope.get(HISTORY_KEY)) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn set_history(&self, namespace: &str, entries: &[StackEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Err(StoreError::Rejected("empty history must be unset".into()));
        }
        let value =
            serde_json::to_value(entries).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut state = self.lock()?;
        let scope = state
            .flags
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match scope {
            Value::Object(map) => {
                map.insert(HISTORY_KEY.to_string(), value);
            }
            other => {
                *other = Value::Object(Map::from_iter([(HISTORY_KEY.to_string(), value)]));
            }
        }
        Ok(())
    }

    async fn unset_history(&self, namespace: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let now_empty = match state.flags.get_mut(namespace) {
            Some(Value::Object(map)) => {
                map.remove(HISTORY_KEY);
                map.is_empty()
            }
            Some(_) => true,
            None => false,
        };
        if now_empty {
            state.flags.remove(namespace);
        }
        Ok(())
    }
}

#[async_trait]
impl Document for FileDocument {
    fn uuid(&self) -> &DocumentUuid {
        &self.uuid
    }

    fn is_owner(&self) -> bool {
        true
    }

    async fn snapshot(&self) -> Result<Map<String, Value>, StoreError> {
        Ok(self.lock()?.data.clone())
    }

    async fn update(&self, update: &DocumentUpdate, _options: &UpdateOptions) -> Result<(), StoreError> {
        if let Some(history) = &update.history {
            history.persist(self).await?;
        }
        let mut state = self.lock()?;
        apply_to(&mut state.data, &update.fields);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutstack_delta::Delta;
    use mutstack_types::MutationKind;
    use serde_json::json;

    fn write(dir: &tempfile::TempDir, name: &str, value: Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn uuid_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "Actor.hero.json", json!({"data": {}}));
        assert_eq!(FileDocument::open(&path).unwrap().uuid().as_str(), "Actor.hero");

        let path = write(&dir, "named.json", json!({"uuid": "Item.x"}));
        assert_eq!(FileDocument::open(&path).unwrap().uuid().as_str(), "Item.x");
    }

    #[test]
    fn rejects_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileDocument::open(&path).is_err());
        assert!(FileDocument::open(dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn history_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "doc.json", json!({"data": {"hp": 1}, "flags": {"other": true}}));
        let doc = FileDocument::open(&path).unwrap();
        let entry = StackEntry::new(MutationKind::default(), Delta::from_json(&json!({"hp": 1})).unwrap());
        doc.set_history("mutstack", &[entry.clone()]).await.unwrap();
        doc.save().unwrap();

        let reopened = FileDocument::open(&path).unwrap();
        assert_eq!(reopened.history("mutstack").await.unwrap(), Some(vec![entry]));
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["flags"]["mutstack"]["mutate"][0]["class"], json!("mutation"));

        reopened.unset_history("mutstack").await.unwrap();
        reopened.save().unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["flags"], json!({"other": true}));
    }

    #[tokio::test]
    async fn embedded_collections_round_trip_through_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "doc.json",
            json!({"embedded": {"items": {"Rope": {"name": "Rope"}}}}),
        );
        let doc = FileDocument::open(&path).unwrap();
        let store = InMemoryEmbeddedStore::new();
        doc.seed_embedded(&store).unwrap();
        assert_eq!(store.keys(doc.uuid(), "items"), vec!["Rope"]);

        store
            .seed(doc.uuid(), "items", "Sword", json!({"name": "Sword"}).as_object().unwrap().clone())
            .unwrap();
        doc.absorb_embedded(&store).unwrap();
        doc.save().unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["embedded"]["items"]["Sword"], json!({"name": "Sword"}));
    }
}
