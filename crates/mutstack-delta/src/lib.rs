//! Delta store for mutstack.
//!
//! A [`Delta`] is a nested map from field name to new value, where a leaf may
//! also be the [`DeltaNode::Delete`] tombstone or a whole-value
//! [`DeltaNode::Replace`]. Deltas describe both forward
//! updates and the restore data recorded on a mutation stack.
//!
//! # Key Types
//!
//! - [`Delta`] / [`DeltaNode`] -- nested field delta with tombstones
//! - [`merge`](Delta::merge), [`intersect_keys`](Delta::intersect_keys),
//!   [`subtract_known`](Delta::subtract_known) -- the redistribution primitives
//! - [`restore_for`] / [`effective_update`] / [`apply_to`] -- deltas against a
//!   JSON document

pub mod delta;
pub mod document;
pub mod error;
pub mod path;

pub use delta::{Delta, DeltaNode};
pub use document::{apply_to, effective_update, restore_for};
pub use error::{DeltaError, DeltaResult};
pub use path::{DELETE_PREFIX, PATH_SEPARATOR, REPLACE_PREFIX};
