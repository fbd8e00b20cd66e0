use tracing::debug;

use mutstack_types::DocumentUuid;

use crate::entry::{Selector, StackEntry};
use crate::error::{StackError, StackResult};
use crate::traits::HistoryStore;

/// Flag key under which a document's history is stored.
pub const HISTORY_KEY: &str = "mutate";

/// Working copy of one document's mutation history, oldest entry first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationStack {
    document: DocumentUuid,
    entries: Vec<StackEntry>,
}

impl MutationStack {
    /// An empty stack for `document`.
    pub fn new(document: DocumentUuid) -> Self {
        Self {
            document,
            entries: Vec::new(),
        }
    }

    /// Build a stack from persisted history, checking id uniqueness.
    pub fn from_history(
        document: DocumentUuid,
        history: Option<Vec<StackEntry>>,
    ) -> StackResult<Self> {
        let mut stack = Self::new(document);
        for entry in history.unwrap_or_default() {
            stack.push(entry)?;
        }
        Ok(stack)
    }

    /// Read the stack persisted for `document` under `namespace`.
    pub async fn load<S>(store: &S, document: DocumentUuid, namespace: &str) -> StackResult<Self>
    where
        S: HistoryStore + ?Sized,
    {
        let history = store.history(namespace).await?;
        Self::from_history(document, history)
    }

    pub fn document(&self) -> &DocumentUuid {
        &self.document
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StackEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The newest entry.
    pub fn last(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    /// Append an entry on top of the stack.
    pub fn push(&mut self, entry: StackEntry) -> StackResult<()> {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(StackError::DuplicateId {
                document: self.document.clone(),
                id: entry.id,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Index of the entry `selector` picks. Names resolve to the newest
    /// entry carrying them.
    pub fn position(&self, selector: &Selector) -> Option<usize> {
        match selector {
            Selector::Latest => self.entries.len().checked_sub(1),
            other => self.entries.iter().rposition(|e| e.matches(other)),
        }
    }

    /// The entry `selector` picks, if any.
    pub fn peek(&self, selector: &Selector) -> Option<&StackEntry> {
        self.position(selector).map(|index| &self.entries[index])
    }

    /// The newest entry satisfying `predicate`.
    pub fn find<P>(&self, predicate: P) -> Option<&StackEntry>
    where
        P: Fn(&StackEntry) -> bool,
    {
        self.entries.iter().rev().find(|e| predicate(e))
    }

    /// Remove the entry `selector` picks, redistributing its delta.
    ///
    /// Returns the removed entry carrying only the fields it still owns.
    pub fn pop(&mut self, selector: &Selector) -> Option<StackEntry> {
        let index = self.position(selector)?;
        self.remove_and_redistribute(index)
    }

    /// Remove the entry at `index`, handing overlapping fields to newer
    /// entries.
    ///
    /// Walks the newer entries oldest first. Each newer entry takes the
    /// removed entry's values for the fields it also restores, and those
    /// fields are then dropped from the removed entry, so the next newer
    /// entry only sees what is left. The returned entry's delta is exactly
    /// what reverting it should write.
    pub fn remove_and_redistribute(&mut self, index: usize) -> Option<StackEntry> {
        if index >= self.entries.len() {
            return None;
        }

        let mut removed = self.entries.remove(index);
        for i in index..self.entries.len() {
            if removed.delta.is_empty() {
                break;
            }

            let spillover = removed.delta.intersect_keys(&self.entries[i].delta);
            if !spillover.is_empty() {
                let newer = &self.entries[i];
                debug!(
                    doc = %self.document,
                    removed = %removed.id,
                    into = %newer.id,
                    fields = ?spillover.leaf_paths(),
                    "redistributing overlapping fields"
                );
                let replacement = StackEntry {
                    delta: newer.delta.merge(&spillover),
                    ..newer.clone()
                };
                self.entries[i] = replacement;
            }

            removed.delta = removed.delta.subtract_known(&self.entries[i].delta);
        }

        Some(removed)
    }

    /// The persisted form: `None` when the stack is empty.
    pub fn to_history(&self) -> Option<Vec<StackEntry>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.clone())
        }
    }

    /// Persist the stack, clearing the flag when it is empty.
    pub async fn commit<S>(&self, store: &S, namespace: &str) -> StackResult<()>
    where
        S: HistoryStore + ?Sized,
    {
        match self.to_history() {
            Some(entries) => {
                debug!(doc = %self.document, entries = entries.len(), "committing history");
                store.set_history(namespace, &entries).await?;
            }
            None => {
                debug!(doc = %self.document, "clearing empty history");
                store.unset_history(namespace).await?;
            }
        }
        Ok(())
    }
}
