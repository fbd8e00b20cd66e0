//! Reconstructing mutations from stack entries.
//!
//! Each [`StackEntry`] records the kind of mutation that produced it. On
//! revert the entry is handed to the factory registered for that kind, so a
//! specialised mutation can come back with its own callbacks attached.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use mutstack_stack::{MutationStack, StackEntry};
use mutstack_types::{DocumentUuid, MutationKind};

use crate::mutation::Mutation;

/// Rebuilds a [`Mutation`] of one kind from its stack entry.
pub trait MutationFactory: Send + Sync {
    fn rebuild(&self, document: DocumentUuid, entry: &StackEntry) -> Mutation;
}

impl<F> MutationFactory for F
where
    F: Fn(DocumentUuid, &StackEntry) -> Mutation + Send + Sync,
{
    fn rebuild(&self, document: DocumentUuid, entry: &StackEntry) -> Mutation {
        self(document, entry)
    }
}

/// The factory for the default kind: a plain [`Mutation::from_entry`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainMutationFactory;

impl MutationFactory for PlainMutationFactory {
    fn rebuild(&self, document: DocumentUuid, entry: &StackEntry) -> Mutation {
        Mutation::from_entry(document, entry)
    }
}

/// Maps kind tags to the factories that rebuild them.
#[derive(Clone)]
pub struct KindRegistry {
    factories: HashMap<MutationKind, Arc<dyn MutationFactory>>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut factories: HashMap<MutationKind, Arc<dyn MutationFactory>> = HashMap::new();
        factories.insert(MutationKind::default(), Arc::new(PlainMutationFactory));
        Self { factories }
    }
}

impl KindRegistry {
    /// A registry knowing only the default kind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: MutationKind, factory: F)
    where
        F: MutationFactory + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn contains(&self, kind: &MutationKind) -> bool {
        self.factories.contains_key(kind)
    }

    /// The factory for `kind`, falling back to the default kind.
    pub fn factory(&self, kind: &MutationKind) -> Arc<dyn MutationFactory> {
        if let Some(factory) = self.factories.get(kind) {
            return factory.clone();
        }
        warn!(%kind, "unknown mutation kind, rebuilding as a plain mutation");
        self.factories
            .get(&MutationKind::default())
            .cloned()
            .unwrap_or_else(|| Arc::new(PlainMutationFactory))
    }

    /// Remove the entry at `index` from `stack` (redistributing its delta)
    /// and rebuild the mutation that reverts it.
    ///
    /// The stack is only changed in memory; committing it is up to the
    /// caller.
    pub fn from_stack(
        &self,
        stack: &mut MutationStack,
        index: usize,
    ) -> Option<(StackEntry, Mutation)> {
        let entry = stack.remove_and_redistribute(index)?;
        let mutation = self
            .factory(&entry.kind)
            .rebuild(stack.document().clone(), &entry);
        Some((entry, mutation))
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.factories.keys().map(MutationKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}
