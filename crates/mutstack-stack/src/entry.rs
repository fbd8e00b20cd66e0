//! Core stack types: [`StackEntry`], [`Link`] and [`Selector`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use mutstack_delta::Delta;
use mutstack_types::{DocumentUuid, MutationId, MutationKind};

/// Top-level field of a restore delta holding embedded collection inverses,
/// keyed by collection and then by literal item key.
pub const EMBEDDED_KEY: &str = "embedded";

/// A weak reference to a mutation recorded on another document.
///
/// Links are resolved only when the entry holding them is reverted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub uuid: DocumentUuid,
    pub mutation_id: MutationId,
}

impl Link {
    pub fn new(uuid: DocumentUuid, mutation_id: MutationId) -> Self {
        Self { uuid, mutation_id }
    }
}

/// The persisted record of one applied mutation.
///
/// Everything except `delta` is fixed once the entry is pushed; the delta
/// changes only when an older entry is removed and hands fields over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    pub id: MutationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The mutation variant that produced this entry.
    #[serde(rename = "class", default)]
    pub kind: MutationKind,
    /// Restore delta: writing it undoes this mutation.
    #[serde(with = "restore_delta")]
    pub delta: Delta,
    /// Whether an owner-equivalent party created the entry.
    pub owner: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    /// Comparison key per embedded collection recorded in `delta`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comparison_keys: BTreeMap<String, String>,
}

impl StackEntry {
    /// A fresh owner-created entry with a new id.
    pub fn new(kind: MutationKind, delta: Delta) -> Self {
        Self {
            id: MutationId::new(),
            name: None,
            kind,
            delta,
            owner: true,
            links: Vec::new(),
            comparison_keys: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: MutationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner(mut self, owner: bool) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// The name if set, otherwise the id.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Whether this entry is selected by an id or name selector.
    ///
    /// [`Selector::Latest`] is positional and never matches a single entry.
    pub fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Latest => false,
            Selector::Id(id) => self.id == *id,
            Selector::Name(name) => self.name.as_deref() == Some(name.as_str()),
        }
    }
}

/// How a caller picks an entry on a stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// The newest entry.
    Latest,
    Id(MutationId),
    /// The newest entry carrying this name.
    Name(String),
}

impl Selector {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl From<MutationId> for Selector {
    fn from(id: MutationId) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "name {name:?}"),
        }
    }
}

/// Serde for restore deltas. Item keys under [`EMBEDDED_KEY`] are read back
/// literally, so an item named `Potion 1.5` is not split into a path.
mod restore_delta {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use mutstack_delta::{Delta, DeltaNode};

    use super::EMBEDDED_KEY;

    pub fn serialize<S: Serializer>(delta: &Delta, serializer: S) -> Result<S::Ok, S::Error> {
        delta.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Delta, D::Error> {
        let Value::Object(mut fields) = Value::deserialize(deserializer)? else {
            return Err(D::Error::custom("restore delta must be an object"));
        };
        let embedded = fields.remove(EMBEDDED_KEY);
        let mut delta = Delta::from_object(&fields).map_err(D::Error::custom)?;

        if let Some(embedded) = embedded {
            let Value::Object(collections) = embedded else {
                return Err(D::Error::custom("embedded inverses must be an object"));
            };
            let mut inverses = Delta::new();
            for (collection, items) in &collections {
                let items = Delta::from_json_literal(items).map_err(D::Error::custom)?;
                inverses.insert(collection.clone(), DeltaNode::Nested(items));
            }
            delta.insert(EMBEDDED_KEY, DeltaNode::Nested(inverses));
        }
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_serializes_with_class_tag() {
        let delta = Delta::from_json(&json!({"hp": 10})).unwrap();
        let entry = StackEntry::new(MutationKind::default(), delta).with_name("polymorph");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["class"], json!("mutation"));
        assert_eq!(value["name"], json!("polymorph"));
        assert_eq!(value["delta"], json!({"hp": 10}));
        assert!(value.get("links").is_none());

        let back: StackEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn embedded_item_keys_survive_a_round_trip() {
        let items = Delta::from_json_literal(&json!({
            "Potion 1.5": {"qty": 2},
            "-=Rope v2": null,
            "==Shield": {"name": "Shield"}
        }))
        .unwrap();
        let mut collections = Delta::new();
        collections.insert("items", mutstack_delta::DeltaNode::Nested(items));
        let mut delta = Delta::from_json(&json!({"hp": 3, "system.ac": 1})).unwrap();
        delta.insert(EMBEDDED_KEY, mutstack_delta::DeltaNode::Nested(collections));
        let entry = StackEntry::new(MutationKind::default(), delta);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["delta"]["embedded"]["items"]["Potion 1.5"], json!({"qty": 2}));
        let back: StackEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
        assert!(back.delta.get_path("embedded.items").unwrap().as_nested().unwrap().get("Potion 1.5").is_some());
    }

    #[test]
    fn restore_delta_must_be_an_object() {
        let mut value = serde_json::to_value(StackEntry::new(MutationKind::default(), Delta::new())).unwrap();
        value["delta"] = json!([1]);
        assert!(serde_json::from_value::<StackEntry>(value.clone()).is_err());
        value["delta"] = json!({"embedded": 3});
        assert!(serde_json::from_value::<StackEntry>(value).is_err());
    }

    #[test]
    fn selector_matching() {
        let entry = StackEntry::new(MutationKind::default(), Delta::new()).with_name("shrink");
        assert!(entry.matches(&Selector::name("shrink")));
        assert!(entry.matches(&Selector::Id(entry.id)));
        assert!(!entry.matches(&Selector::name("grow")));
        assert!(!entry.matches(&Selector::Latest));
    }

    #[test]
    fn label_falls_back_to_id() {
        let entry = StackEntry::new(MutationKind::default(), Delta::new());
        assert_eq!(entry.label(), entry.id.to_string());
    }
}
