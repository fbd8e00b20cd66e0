//! Mutation stack for mutstack.
//!
//! Every document carries an ordered log (oldest to newest) of the
//! mutations applied to it. Each [`StackEntry`] holds the restore delta that
//! undoes its mutation. Entries can be reverted from anywhere in the stack:
//! removing an entry hands any field a newer entry has since re-touched over
//! to that newer entry, so later reverts still restore the right values.
//!
//! # Architecture
//!
//! - [`MutationStack`] is an in-memory working copy of a document's history.
//!   Nothing is persisted until [`MutationStack::commit`] is called.
//! - [`HistoryStore`] is the persistence boundary. An empty stack is never
//!   stored as an empty list; its absence *is* the empty history.
//!
//! # Modules
//!
//! - [`error`] — Error types for stack operations
//! - [`entry`] — [`StackEntry`], [`Link`] and [`Selector`]
//! - [`stack`] — [`MutationStack`] and redistribution
//! - [`traits`] — The [`HistoryStore`] persistence trait
//! - [`memory`] — In-memory [`InMemoryHistory`] for tests

pub mod entry;
pub mod error;
pub mod memory;
pub mod stack;
pub mod traits;

pub use entry::{Link, Selector, StackEntry, EMBEDDED_KEY};
pub use error::{StackError, StackResult, StoreError};
pub use memory::InMemoryHistory;
pub use stack::{MutationStack, HISTORY_KEY};
pub use traits::HistoryStore;
