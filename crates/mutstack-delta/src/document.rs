//! Deltas measured against, and written into, a JSON document.
//!
//! Documents are JSON objects. A forward update is first reduced to the part
//! that actually changes the document; its restore delta records the values
//! that part overwrites (or a tombstone where the field did not exist).
//! An overwritten object is recorded as a [`DeltaNode::Replace`], so writing
//! the restore brings back exactly that object.

use serde_json::{Map, Value};

use crate::delta::{Delta, DeltaNode};

/// The subset of `update` that would change `document`.
pub fn effective_update(document: &Map<String, Value>, update: &Delta) -> Delta {
    let mut out = Delta::new();
    for (key, node) in update {
        let current = document.get(key);
        match node {
            DeltaNode::Value(value) | DeltaNode::Replace(value) => {
                if current != Some(value) {
                    out.insert(key.clone(), node.clone());
                }
            }
            DeltaNode::Nested(child) => {
                let empty = Map::new();
                let scope = match current {
                    Some(Value::Object(map)) => map,
                    _ => &empty,
                };
                let sub = effective_update(scope, child);
                if !sub.is_empty() {
                    out.insert(key.clone(), DeltaNode::Nested(sub));
                }
            }
            DeltaNode::Delete => {
                if current.is_some() {
                    out.insert(key.clone(), DeltaNode::Delete);
                }
            }
        }
    }
    out
}

/// The delta that undoes `update` when written after it.
pub fn restore_for(document: &Map<String, Value>, update: &Delta) -> Delta {
    let effective = effective_update(document, update);
    restore_effective(document, &effective)
}

fn restore_effective(document: &Map<String, Value>, effective: &Delta) -> Delta {
    let mut out = Delta::new();
    for (key, node) in effective {
        let current = document.get(key);
        let restore = match (node, current) {
            (_, None) => DeltaNode::Delete,
            (DeltaNode::Nested(child), Some(Value::Object(map))) => {
                DeltaNode::Nested(restore_effective(map, child))
            }
            (_, Some(previous)) => DeltaNode::overwrite(previous),
        };
        out.insert(key.clone(), restore);
    }
    out
}

/// Write `delta` into `document`.
///
/// Nested deltas landing on a non-object field replace it with an object.
pub fn apply_to(document: &mut Map<String, Value>, delta: &Delta) {
    for (key, node) in delta {
        match node {
            DeltaNode::Value(value) | DeltaNode::Replace(value) => {
                document.insert(key.clone(), value.clone());
            }
            DeltaNode::Delete => {
                document.remove(key);
            }
            DeltaNode::Nested(child) => {
                let slot = document
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(map) = slot {
                    apply_to(map, child);
                }
            }
        }
    }
}
