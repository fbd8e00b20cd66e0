//! Key path syntax.
//!
//! Keys in a JSON delta may be dotted paths (`system.hp.value`). The final
//! segment may carry the tombstone prefix (`system.-=effects`), which marks
//! the field for deletion and must map to `null`, or the replacement prefix
//! (`system.==effects`), which writes the value whole instead of merging it.

use crate::error::{DeltaError, DeltaResult};

/// Separator between segments of a dotted key path.
pub const PATH_SEPARATOR: char = '.';

/// Prefix marking the final segment of a key as a tombstone.
pub const DELETE_PREFIX: &str = "-=";

/// Prefix marking the final segment of a key as a whole-value replacement.
pub const REPLACE_PREFIX: &str = "==";

/// What the final segment of a key asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOp {
    /// Plain key: objects merge into the field.
    Set,
    /// [`DELETE_PREFIX`]: the field is removed.
    Delete,
    /// [`REPLACE_PREFIX`]: the value overwrites the field as a whole.
    Replace,
}

/// A parsed key path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPath {
    pub segments: Vec<String>,
    pub op: KeyOp,
}

/// Split a key operation prefix off one segment.
pub fn split_op(segment: &str) -> (KeyOp, &str) {
    if let Some(name) = segment.strip_prefix(DELETE_PREFIX) {
        (KeyOp::Delete, name)
    } else if let Some(name) = segment.strip_prefix(REPLACE_PREFIX) {
        (KeyOp::Replace, name)
    } else {
        (KeyOp::Set, segment)
    }
}

/// Parse a raw key into its segments.
pub fn parse_key(raw: &str) -> DeltaResult<KeyPath> {
    if raw.is_empty() {
        return Err(DeltaError::invalid_path(raw, "empty key"));
    }

    let parts: Vec<&str> = raw.split(PATH_SEPARATOR).collect();
    let last = parts.len() - 1;
    let mut segments = Vec::with_capacity(parts.len());
    let mut op = KeyOp::Set;

    for (i, part) in parts.into_iter().enumerate() {
        if part.is_empty() {
            return Err(DeltaError::invalid_path(raw, "empty path segment"));
        }
        let (segment_op, name) = split_op(part);
        if segment_op != KeyOp::Set {
            if i != last {
                return Err(DeltaError::invalid_path(
                    raw,
                    "key prefixes are only allowed on the final segment",
                ));
            }
            if name.is_empty() {
                return Err(DeltaError::invalid_path(raw, "prefix without a field name"));
            }
            op = segment_op;
        }
        segments.push(name.to_string());
    }

    Ok(KeyPath { segments, op })
}

/// Parse a raw key as one literal field name, dots included.
///
/// Only the operation prefix is interpreted.
pub fn parse_literal_key(raw: &str) -> DeltaResult<KeyPath> {
    let (op, name) = split_op(raw);
    if name.is_empty() {
        return Err(DeltaError::invalid_path(raw, "empty key"));
    }
    Ok(KeyPath {
        segments: vec![name.to_string()],
        op,
    })
}

/// Join segments back into a dotted path.
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push(PATH_SEPARATOR);
        }
        out.push_str(seg.as_ref());
    }
    out
}

/// Render a field name as its tombstone key.
pub fn tombstone_key(name: &str) -> String {
    format!("{DELETE_PREFIX}{name}")
}

/// Render a field name as its replacement key.
pub fn replace_key(name: &str) -> String {
    format!("{REPLACE_PREFIX}{name}")
}
