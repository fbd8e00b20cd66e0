//! The [`Delta`] type and its merge/redistribution primitives.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::document::apply_to;
use crate::error::{DeltaError, DeltaResult};
use crate::path::{join_path, parse_key, parse_literal_key, replace_key, tombstone_key, KeyOp, KeyPath};

/// One field of a [`Delta`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaNode {
    /// A non-object leaf value.
    Value(Value),
    /// A nested field map, merged into the field when written.
    Nested(Delta),
    /// Tombstone: the field is deleted.
    Delete,
    /// A whole value written over the field, objects included. Rendered as
    /// `"==field": value`.
    Replace(Value),
}

impl DeltaNode {
    /// Convert a JSON value. Objects become [`DeltaNode::Nested`].
    pub fn from_json(value: &Value) -> DeltaResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::Nested(Delta::from_object(map)?)),
            other => Ok(Self::Value(other.clone())),
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }

    pub fn as_nested(&self) -> Option<&Delta> {
        match self {
            Self::Nested(delta) => Some(delta),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_replacement(&self) -> Option<&Value> {
        match self {
            Self::Replace(value) => Some(value),
            _ => None,
        }
    }

    /// The node that writes `value` exactly, replacing an object instead of
    /// merging into it.
    pub fn overwrite(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Replace(value.clone()),
            other => Self::Value(other.clone()),
        }
    }

    fn parse(key: &KeyPath, raw: &str, value: &Value) -> DeltaResult<Self> {
        match key.op {
            KeyOp::Set => Self::from_json(value),
            KeyOp::Replace => Ok(Self::Replace(value.clone())),
            KeyOp::Delete if value.is_null() => Ok(Self::Delete),
            KeyOp::Delete => Err(DeltaError::invalid_path(raw, "tombstone keys must map to null")),
        }
    }
}

/// A nested mapping from field name to new value.
///
/// Deltas serialize to nested JSON objects with tombstones written as
/// `"-=field": null`, and parse from the same shape with dotted key paths
/// expanded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    fields: BTreeMap<String, DeltaNode>,
}

impl Delta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, key: &str) -> Option<&DeltaNode> {
        self.fields.get(key)
    }

    /// Look up a node by dotted path.
    pub fn get_path(&self, path: &str) -> Option<&DeltaNode> {
        let mut segments = path.split(crate::path::PATH_SEPARATOR);
        let mut node = self.fields.get(segments.next()?)?;
        for segment in segments {
            node = node.as_nested()?.fields.get(segment)?;
        }
        Some(node)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.get_path(path).is_some()
    }

    /// Insert a top-level node, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, node: DeltaNode) -> Option<DeltaNode> {
        self.fields.insert(key.into(), node)
    }

    pub fn remove(&mut self, key: &str) -> Option<DeltaNode> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, DeltaNode> {
        self.fields.iter()
    }

    /// Set a value at a dotted path. Object values become nested maps.
    pub fn set(&mut self, path: &str, value: Value) -> DeltaResult<()> {
        let key = parse_key(path)?;
        if key.op != KeyOp::Set {
            return Err(DeltaError::invalid_path(path, "use `delete` or `replace` for prefixed keys"));
        }
        let node = DeltaNode::from_json(&value)?;
        self.insert_at(path, &key.segments, node)
    }

    /// Mark the field at a dotted path for deletion.
    pub fn delete(&mut self, path: &str) -> DeltaResult<()> {
        let key = parse_key(path)?;
        if key.op == KeyOp::Replace {
            return Err(DeltaError::invalid_path(path, "replacement key used for a deletion"));
        }
        self.insert_at(path, &key.segments, DeltaNode::Delete)
    }

    /// Overwrite the field at a dotted path with `value` as a whole.
    pub fn replace(&mut self, path: &str, value: Value) -> DeltaResult<()> {
        let key = parse_key(path)?;
        if key.op == KeyOp::Delete {
            return Err(DeltaError::invalid_path(path, "use `delete` for tombstones"));
        }
        self.insert_at(path, &key.segments, DeltaNode::Replace(value))
    }

    /// Builder form of [`Self::set`].
    pub fn with(mut self, path: &str, value: Value) -> DeltaResult<Self> {
        self.set(path, value)?;
        Ok(self)
    }

    /// Parse a JSON object, expanding dotted keys and tombstones.
    pub fn from_json(value: &Value) -> DeltaResult<Self> {
        match value {
            Value::Object(map) => Self::from_object(map),
            other => Err(DeltaError::NotAnObject(value_kind(other))),
        }
    }

    /// Parse a JSON object map, expanding dotted keys and tombstones.
    pub fn from_object(map: &Map<String, Value>) -> DeltaResult<Self> {
        let mut delta = Self::new();
        for (raw, value) in map {
            let key = parse_key(raw)?;
            let node = DeltaNode::parse(&key, raw, value)?;
            delta.insert_at(raw, &key.segments, node)?;
        }
        Ok(delta)
    }

    /// Parse a JSON object whose top-level keys are literal names.
    ///
    /// Dots in a top-level key are part of the name; only the `-=` and `==`
    /// prefixes are interpreted. Values below the top level parse as in
    /// [`Self::from_json`].
    pub fn from_json_literal(value: &Value) -> DeltaResult<Self> {
        match value {
            Value::Object(map) => Self::from_object_literal(map),
            other => Err(DeltaError::NotAnObject(value_kind(other))),
        }
    }

    pub fn from_object_literal(map: &Map<String, Value>) -> DeltaResult<Self> {
        let mut delta = Self::new();
        for (raw, value) in map {
            let key = parse_literal_key(raw)?;
            let node = DeltaNode::parse(&key, raw, value)?;
            delta.insert_at(raw, &key.segments, node)?;
        }
        Ok(delta)
    }

    /// Render as nested JSON with tombstones as `"-=field": null`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, node) in &self.fields {
            match node {
                DeltaNode::Value(value) => {
                    map.insert(key.clone(), value.clone());
                }
                DeltaNode::Nested(delta) => {
                    map.insert(key.clone(), delta.to_json());
                }
                DeltaNode::Delete => {
                    map.insert(tombstone_key(key), Value::Null);
                }
                DeltaNode::Replace(value) => {
                    map.insert(replace_key(key), value.clone());
                }
            }
        }
        Value::Object(map)
    }

    /// Dotted paths of every leaf, tombstones rendered with their prefix.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves(&self, prefix: &mut Vec<String>, out: &mut Vec<String>) {
        for (key, node) in &self.fields {
            match node {
                DeltaNode::Nested(child) => {
                    prefix.push(key.clone());
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
                DeltaNode::Value(_) => {
                    prefix.push(key.clone());
                    out.push(join_path(prefix));
                    prefix.pop();
                }
                DeltaNode::Delete => {
                    prefix.push(tombstone_key(key));
                    out.push(join_path(prefix));
                    prefix.pop();
                }
                DeltaNode::Replace(_) => {
                    prefix.push(replace_key(key));
                    out.push(join_path(prefix));
                    prefix.pop();
                }
            }
        }
    }

    /// Deep-merge `overlay` on top of this delta, returning the result.
    pub fn merge(&self, overlay: &Delta) -> Delta {
        let mut out = self.clone();
        out.merge_in(overlay);
        out
    }

    /// Deep-merge `overlay` into this delta in place.
    ///
    /// The result writes the same as this delta followed by `overlay`.
    /// Leaves, tombstones and replacements from the overlay win; nested maps
    /// recurse. A nested overlay on a replacement is written into the
    /// replaced value, and on a plain leaf or tombstone it becomes a
    /// replacement by the object it builds. An empty nested overlay changes
    /// nothing.
    pub fn merge_in(&mut self, overlay: &Delta) {
        for (key, incoming) in &overlay.fields {
            let DeltaNode::Nested(over) = incoming else {
                self.fields.insert(key.clone(), incoming.clone());
                continue;
            };
            if over.is_empty() {
                continue;
            }
            match self.fields.get_mut(key) {
                None => {
                    self.fields.insert(key.clone(), incoming.clone());
                }
                Some(DeltaNode::Nested(base)) => base.merge_in(over),
                Some(DeltaNode::Replace(Value::Object(base))) => apply_to(base, over),
                Some(slot) => {
                    let mut built = Map::new();
                    apply_to(&mut built, over);
                    *slot = DeltaNode::Replace(Value::Object(built));
                }
            }
        }
    }

    /// The part of this delta whose key paths also exist in `other`, with
    /// this delta's values.
    ///
    /// Anything but a nested map on both sides counts as one opaque leaf and
    /// is taken whole.
    pub fn intersect_keys(&self, other: &Delta) -> Delta {
        let mut out = Delta::new();
        for (key, node) in &self.fields {
            let Some(theirs) = other.fields.get(key) else {
                continue;
            };
            match (node, theirs) {
                (DeltaNode::Nested(mine), DeltaNode::Nested(theirs)) => {
                    let sub = mine.intersect_keys(theirs);
                    if !sub.is_empty() {
                        out.fields.insert(key.clone(), DeltaNode::Nested(sub));
                    }
                }
                _ => {
                    out.fields.insert(key.clone(), node.clone());
                }
            }
        }
        out
    }

    /// This delta without any key path present in `known`.
    pub fn subtract_known(&self, known: &Delta) -> Delta {
        let mut out = Delta::new();
        for (key, node) in &self.fields {
            match (node, known.fields.get(key)) {
                (_, None) => {
                    out.fields.insert(key.clone(), node.clone());
                }
                (DeltaNode::Nested(mine), Some(DeltaNode::Nested(theirs))) => {
                    let sub = mine.subtract_known(theirs);
                    if !sub.is_empty() {
                        out.fields.insert(key.clone(), DeltaNode::Nested(sub));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn insert_at(&mut self, raw: &str, segments: &[String], node: DeltaNode) -> DeltaResult<()> {
        let Some((head, rest)) = segments.split_first() else {
            return Err(DeltaError::invalid_path(raw, "empty key"));
        };

        if rest.is_empty() {
            return match self.fields.get_mut(head) {
                None => {
                    self.fields.insert(head.clone(), node);
                    Ok(())
                }
                Some(DeltaNode::Nested(existing)) => match node {
                    DeltaNode::Nested(incoming) => existing.absorb(raw, incoming),
                    _ => Err(DeltaError::invalid_path(raw, "conflicts with another key")),
                },
                Some(_) => Err(DeltaError::invalid_path(raw, "conflicts with another key")),
            };
        }

        let slot = self
            .fields
            .entry(head.clone())
            .or_insert_with(|| DeltaNode::Nested(Delta::new()));
        match slot {
            DeltaNode::Nested(child) => child.insert_at(raw, rest, node),
            _ => Err(DeltaError::invalid_path(raw, "conflicts with another key")),
        }
    }

    fn absorb(&mut self, raw: &str, incoming: Delta) -> DeltaResult<()> {
        for (key, node) in incoming.fields {
            self.insert_at(raw, std::slice::from_ref(&key), node)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Delta {
    type Item = (&'a String, &'a DeltaNode);
    type IntoIter = btree_map::Iter<'a, String, DeltaNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Delta::from_json(&value).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn delta(value: Value) -> Delta {
        Delta::from_json(&value).unwrap()
    }

    #[test]
    fn dotted_keys_expand() {
        let d = delta(json!({"system.hp.value": 5, "name": "Goblin"}));
        assert_eq!(d.len(), 2);
        assert_eq!(
            d.get_path("system.hp.value"),
            Some(&DeltaNode::Value(json!(5)))
        );
        assert_eq!(d, delta(json!({"system": {"hp": {"value": 5}}, "name": "Goblin"})));
    }

    #[test]
    fn dotted_and_nested_forms_combine() {
        let d = delta(json!({"system": {"hp": 5}, "system.ac": 12}));
        assert_eq!(d.leaf_paths(), vec!["system.ac", "system.hp"]);
    }

    #[test]
    fn tombstones_parse_and_render() {
        let d = delta(json!({"system.-=effects": null, "-=flags": null}));
        assert_eq!(d.get_path("system.effects"), Some(&DeltaNode::Delete));
        assert_eq!(d.get("flags"), Some(&DeltaNode::Delete));
        assert_eq!(d.to_json(), json!({"system": {"-=effects": null}, "-=flags": null}));
    }

    #[test]
    fn tombstone_with_value_is_invalid() {
        let err = Delta::from_json(&json!({"-=hp": 3})).unwrap_err();
        assert!(matches!(err, DeltaError::InvalidPath { .. }));
    }

    #[test]
    fn conflicting_keys_are_invalid() {
        let err = Delta::from_json(&json!({"hp": 1, "hp.value": 2})).unwrap_err();
        assert!(matches!(err, DeltaError::InvalidPath { .. }));
    }

    #[test]
    fn non_object_rejected() {
        assert_eq!(
            Delta::from_json(&json!([1, 2])).unwrap_err(),
            DeltaError::NotAnObject("array")
        );
    }

    #[test]
    fn serde_uses_json_shape() {
        let d = delta(json!({"a": {"b": 1}, "-=c": null}));
        let text = serde_json::to_string(&d).unwrap();
        let back: Delta = serde_json::from_str(&text).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn builder_set_and_delete() {
        let mut d = Delta::new().with("system.hp", json!(7)).unwrap();
        d.delete("system.temp").unwrap();
        assert_eq!(d.to_json(), json!({"system": {"hp": 7, "-=temp": null}}));
        assert!(d.set("system.-=hp", json!(1)).is_err());
    }

    #[test]
    fn merge_overlay_wins_on_leaves() {
        let base = delta(json!({"hp": 10, "size": 1}));
        let overlay = delta(json!({"hp": 3}));
        assert_eq!(base.merge(&overlay), delta(json!({"hp": 3, "size": 1})));
    }

    #[test]
    fn merge_recurses_into_nested() {
        let base = delta(json!({"system": {"hp": 10, "ac": 12}}));
        let overlay = delta(json!({"system": {"hp": 4}, "name": "x"}));
        assert_eq!(
            base.merge(&overlay),
            delta(json!({"system": {"hp": 4, "ac": 12}, "name": "x"}))
        );
    }

    #[test]
    fn merge_propagates_tombstones() {
        let base = delta(json!({"effects": {"haste": true}}));
        let overlay = delta(json!({"-=effects": null}));
        let merged = base.merge(&overlay);
        assert_eq!(merged.get("effects"), Some(&DeltaNode::Delete));
    }

    #[test]
    fn merge_with_empty_is_noop() {
        let base = delta(json!({"hp": 10}));
        assert_eq!(base.merge(&Delta::new()), base);
        assert_eq!(Delta::new().merge(&base), base);
        assert_eq!(base.merge(&delta(json!({"hp": {}}))), base);
    }

    #[test]
    fn intersect_takes_left_values() {
        let a = delta(json!({"hp": 10, "size": 1, "system": {"ac": 12, "speed": 30}}));
        let b = delta(json!({"hp": 99, "system": {"ac": 1}, "other": 0}));
        assert_eq!(
            a.intersect_keys(&b),
            delta(json!({"hp": 10, "system": {"ac": 12}}))
        );
    }

    #[test]
    fn intersect_leaf_against_nested_takes_whole_leaf() {
        let a = delta(json!({"system": 5}));
        let b = delta(json!({"system": {"ac": 1}}));
        assert_eq!(a.intersect_keys(&b), a);
    }

    #[test]
    fn subtract_known_strips_claimed_paths() {
        let a = delta(json!({"hp": 10, "size": 1, "system": {"ac": 12, "speed": 30}}));
        let known = delta(json!({"hp": 0, "system": {"ac": 0}}));
        assert_eq!(
            a.subtract_known(&known),
            delta(json!({"size": 1, "system": {"speed": 30}}))
        );
    }

    #[test]
    fn subtract_drops_emptied_maps() {
        let a = delta(json!({"system": {"ac": 12}}));
        let known = delta(json!({"system": {"ac": 0}}));
        assert!(a.subtract_known(&known).is_empty());
    }

    #[test]
    fn replacements_parse_and_render() {
        let d = delta(json!({"==size": {"w": 1, "a.b": 2}, "system.==ac": 3}));
        assert_eq!(d.get("size"), Some(&DeltaNode::Replace(json!({"w": 1, "a.b": 2}))));
        assert_eq!(d.get_path("system.ac"), Some(&DeltaNode::Replace(json!(3))));
        assert_eq!(d.leaf_paths(), vec!["==size", "system.==ac"]);
        let text = serde_json::to_string(&d).unwrap();
        assert_eq!(serde_json::from_str::<Delta>(&text).unwrap(), d);
        assert!(Delta::new().replace("-=size", json!(1)).is_err());
    }

    #[test]
    fn literal_top_level_keys() {
        let d = Delta::from_json_literal(&json!({
            "Potion 1.5": {"qty.max": 2},
            "-=Rope v2.0": null,
            "==Shield": {"a": 1}
        }))
        .unwrap();
        assert_eq!(d.len(), 3);
        assert_eq!(d.get("Potion 1.5").unwrap().as_nested(), Some(&delta(json!({"qty": {"max": 2}}))));
        assert!(d.get("Rope v2.0").unwrap().is_delete());
        assert_eq!(d.get("Shield").unwrap().as_replacement(), Some(&json!({"a": 1})));
        assert!(Delta::from_json_literal(&json!({"-=x": 1})).is_err());
        assert!(Delta::from_json_literal(&json!("x")).is_err());
    }

    #[test]
    fn nested_overlay_writes_into_replacement() {
        let base = delta(json!({"==a": {"x": 2, "y": 2}}));
        let overlay = delta(json!({"a": {"x": 1, "-=y": null, "z": 3}}));
        assert_eq!(base.merge(&overlay), delta(json!({"==a": {"x": 1, "z": 3}})));
    }

    #[test]
    fn nested_overlay_on_leaf_becomes_replacement() {
        let overlay = delta(json!({"a": {"x": 1}}));
        assert_eq!(
            delta(json!({"a": 5})).merge(&overlay),
            delta(json!({"==a": {"x": 1}}))
        );
        assert_eq!(
            delta(json!({"-=a": null})).merge(&overlay),
            delta(json!({"==a": {"x": 1}}))
        );
    }

    #[test]
    fn replacement_overlay_wins_over_nested() {
        let base = delta(json!({"a": {"x": 1}}));
        let overlay = delta(json!({"==a": {"y": 2}}));
        assert_eq!(base.merge(&overlay), overlay);
    }

    #[test]
    fn replacement_is_an_opaque_leaf_for_redistribution() {
        let mine = delta(json!({"==a": {"x": 1}, "b": 1}));
        let theirs = delta(json!({"a": {"z": 0}}));
        assert_eq!(mine.intersect_keys(&theirs), delta(json!({"==a": {"x": 1}})));
        assert_eq!(mine.subtract_known(&theirs), delta(json!({"b": 1})));

        let nested = delta(json!({"a": {"x": 1}}));
        let replaced = delta(json!({"==a": {"x": 5, "y": 2}}));
        assert_eq!(nested.intersect_keys(&replaced), nested);
        assert!(nested.subtract_known(&replaced).is_empty());
    }

    fn flat_delta() -> impl Strategy<Value = Delta> {
        prop::collection::btree_map("[a-e]", prop::option::of(0i64..5), 0..5).prop_map(|map| {
            let mut d = Delta::new();
            for (key, value) in map {
                let node = match value {
                    Some(v) => DeltaNode::Value(json!(v)),
                    None => DeltaNode::Delete,
                };
                d.insert(key, node);
            }
            d
        })
    }

    proptest! {
        #[test]
        fn intersect_and_subtract_partition(a in flat_delta(), b in flat_delta()) {
            let shared = a.intersect_keys(&b);
            let rest = a.subtract_known(&b);
            prop_assert_eq!(shared.len() + rest.len(), a.len());
            prop_assert_eq!(rest.merge(&shared), a);
        }
    }
}
