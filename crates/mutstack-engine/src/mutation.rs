//! The [`Mutation`] value object: a pending change plus its callbacks.

use std::collections::BTreeMap;
use std::sync::Arc;

use mutstack_delta::{Delta, DeltaNode};
use mutstack_hooks::{CallbackRegistry, CallbackStage, MutationCallback, StageContext, StageReport};
use mutstack_stack::{Link, MutationStack, StackEntry, StackResult};
use mutstack_types::{DocumentUuid, MutationId, MutationKind};

use crate::traits::{HistoryWrite, UpdateOptions};

pub use mutstack_stack::EMBEDDED_KEY;

/// Comparison key used when a caller does not name one.
pub const DEFAULT_COMPARISON_KEY: &str = "name";

/// Shorthand update for one embedded collection.
///
/// Top-level keys of `shorthand` are item identities matched against the
/// item field named by `comparison_key`; build it with
/// [`Delta::from_json_literal`] so dots stay part of the identity. A nested
/// delta creates or updates the item, a replacement sets it whole and a
/// tombstone deletes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedUpdate {
    pub shorthand: Delta,
    pub comparison_key: String,
}

impl EmbeddedUpdate {
    pub fn new(shorthand: Delta) -> Self {
        Self {
            shorthand,
            comparison_key: DEFAULT_COMPARISON_KEY.to_string(),
        }
    }

    pub fn keyed_by(mut self, comparison_key: impl Into<String>) -> Self {
        self.comparison_key = comparison_key.into();
        self
    }
}

/// A pending change to one document.
///
/// Built with the `with_*` methods and handed to
/// [`MutationEngine::apply`](crate::MutationEngine::apply). Unless marked
/// [`permanent`](Mutation::permanent), applying it pushes a
/// [`StackEntry`] that can later be reverted.
#[derive(Clone, Debug)]
pub struct Mutation {
    document: DocumentUuid,
    update: Delta,
    options: UpdateOptions,
    embedded: BTreeMap<String, EmbeddedUpdate>,
    callbacks: CallbackRegistry,
    id: MutationId,
    name: Option<String>,
    kind: MutationKind,
    permanent: bool,
    links: Vec<Link>,
}

impl Mutation {
    /// An empty mutation targeting `document`, with a fresh id.
    pub fn new(document: DocumentUuid) -> Self {
        Self {
            document,
            update: Delta::new(),
            options: UpdateOptions::default(),
            embedded: BTreeMap::new(),
            callbacks: CallbackRegistry::new(),
            id: MutationId::new(),
            name: None,
            kind: MutationKind::default(),
            permanent: false,
            links: Vec::new(),
        }
    }

    /// The plain mutation that writes `entry`'s delta back to `document`.
    ///
    /// The entry's embedded inverses become embedded updates again. The
    /// result is permanent: reverting never records history of its own.
    pub fn from_entry(document: DocumentUuid, entry: &StackEntry) -> Self {
        let mut update = entry.delta.clone();
        let mut embedded = BTreeMap::new();
        if let Some(DeltaNode::Nested(collections)) = update.remove(EMBEDDED_KEY) {
            for (collection, node) in &collections {
                let Some(shorthand) = node.as_nested() else {
                    continue;
                };
                let comparison_key = entry
                    .comparison_keys
                    .get(collection)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_COMPARISON_KEY.to_string());
                embedded.insert(
                    collection.clone(),
                    EmbeddedUpdate {
                        shorthand: shorthand.clone(),
                        comparison_key,
                    },
                );
            }
        }

        Self {
            update,
            embedded,
            id: entry.id,
            name: entry.name.clone(),
            kind: entry.kind.clone(),
            permanent: true,
            ..Self::new(document)
        }
    }

    pub fn with_update(mut self, update: Delta) -> Self {
        self.update = update;
        self
    }

    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Add (or replace) the shorthand update for one embedded collection.
    pub fn with_embedded(mut self, collection: impl Into<String>, update: EmbeddedUpdate) -> Self {
        self.embedded.insert(collection.into(), update);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: MutationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_kind(mut self, kind: MutationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Apply without recording history.
    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    /// Revert the mutation `mutation_id` on `document` whenever this one
    /// is reverted.
    pub fn link(mut self, document: DocumentUuid, mutation_id: MutationId) -> Self {
        self.links.push(Link::new(document, mutation_id));
        self
    }

    /// Register a callback for `stage`.
    pub fn on<C>(mut self, stage: CallbackStage, callback: C) -> Self
    where
        C: MutationCallback + 'static,
    {
        self.callbacks.register(stage, callback);
        self
    }

    pub fn on_shared(mut self, stage: CallbackStage, callback: Arc<dyn MutationCallback>) -> Self {
        self.callbacks.register_shared(stage, callback);
        self
    }

    pub fn document(&self) -> &DocumentUuid {
        &self.document
    }

    pub fn update(&self) -> &Delta {
        &self.update
    }

    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.callbacks
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &MutationKind {
        &self.kind
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The top-level update and the options to write it with.
    pub fn get_update(&self) -> (&Delta, &UpdateOptions) {
        (&self.update, &self.options)
    }

    /// Embedded updates keyed by collection name.
    pub fn get_embedded(&self) -> &BTreeMap<String, EmbeddedUpdate> {
        &self.embedded
    }

    /// The stack entry this mutation records for `restore`, if any.
    ///
    /// Permanent mutations and mutations that change nothing record no
    /// entry.
    pub fn stack_entry(&self, restore: Delta, owner: bool) -> Option<StackEntry> {
        if self.permanent || restore.is_empty() {
            return None;
        }

        let mut entry = StackEntry::new(self.kind.clone(), restore)
            .with_id(self.id)
            .with_owner(owner);
        entry.name = self.name.clone();
        entry.links = self.links.clone();
        if entry.delta.get(EMBEDDED_KEY).is_some() {
            entry.comparison_keys = self
                .embedded
                .iter()
                .map(|(collection, update)| (collection.clone(), update.comparison_key.clone()))
                .collect();
        }
        Some(entry)
    }

    /// The replacement history to write alongside this mutation's update.
    ///
    /// Returns `None` when there is nothing to record, otherwise the whole
    /// stack with the new entry pushed on top.
    pub fn update_mutation_stack(
        &self,
        stack: &MutationStack,
        restore: Delta,
        owner: bool,
        namespace: &str,
    ) -> StackResult<Option<HistoryWrite>> {
        let Some(entry) = self.stack_entry(restore, owner) else {
            return Ok(None);
        };
        let mut next = stack.clone();
        next.push(entry)?;
        Ok(next.to_history().map(|entries| HistoryWrite {
            namespace: namespace.to_string(),
            entries,
        }))
    }

    /// Run this mutation's callbacks for `context.stage`.
    pub async fn call_all(&self, context: &StageContext) -> StageReport {
        self.callbacks.call_all(context).await
    }

    /// The callback context this mutation presents at `stage`.
    pub fn context(&self, stage: CallbackStage) -> StageContext {
        StageContext {
            stage,
            document: self.document.clone(),
            mutation_id: (!self.permanent).then_some(self.id),
            name: self.name.clone(),
            update: self.update.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutstack_hooks::callback_fn;
    use mutstack_stack::StackError;
    use serde_json::json;

    fn doc() -> DocumentUuid {
        DocumentUuid::parse("Actor.m").unwrap()
    }

    fn delta(value: serde_json::Value) -> Delta {
        Delta::from_json(&value).unwrap()
    }

    #[test]
    fn builder_sets_fields() {
        let id = MutationId::new();
        let other = DocumentUuid::parse("Item.sword").unwrap();
        let m = Mutation::new(doc())
            .with_update(delta(json!({"hp": 1})))
            .named("heal")
            .with_id(id)
            .link(other.clone(), id)
            .on(CallbackStage::PreMutate, callback_fn("noop", |_: &StageContext| true));

        assert_eq!(m.id(), id);
        assert_eq!(m.name(), Some("heal"));
        assert!(!m.is_permanent());
        assert_eq!(m.links(), &[Link::new(other, id)]);
        assert_eq!(m.callbacks().count(CallbackStage::PreMutate), 1);
        assert_eq!(m.get_update().0, &delta(json!({"hp": 1})));
    }

    #[test]
    fn permanent_and_no_op_record_nothing() {
        let m = Mutation::new(doc()).permanent();
        assert!(m.stack_entry(delta(json!({"hp": 1})), true).is_none());
        let m = Mutation::new(doc());
        assert!(m.stack_entry(Delta::new(), true).is_none());
    }

    #[test]
    fn update_mutation_stack_pushes_on_top() {
        let mut stack = MutationStack::new(doc());
        stack
            .push(StackEntry::new(MutationKind::default(), delta(json!({"a": 1}))))
            .unwrap();
        let m = Mutation::new(doc()).named("b");
        let write = m
            .update_mutation_stack(&stack, delta(json!({"b": 2})), true, "ns")
            .unwrap()
            .unwrap();
        assert_eq!(write.namespace, "ns");
        assert_eq!(write.entries.len(), 2);
        assert_eq!(write.entries[1].id, m.id());
        assert_eq!(write.entries[1].name.as_deref(), Some("b"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn update_mutation_stack_rejects_reused_id() {
        let mut stack = MutationStack::new(doc());
        let m = Mutation::new(doc());
        stack
            .push(StackEntry::new(MutationKind::default(), Delta::new()).with_id(m.id()))
            .unwrap();
        let err = m
            .update_mutation_stack(&stack, delta(json!({"b": 2})), true, "ns")
            .unwrap_err();
        assert!(matches!(err, StackError::DuplicateId { .. }));
    }

    #[test]
    fn entry_records_comparison_keys_for_embedded_inverses() {
        let m = Mutation::new(doc()).with_embedded(
            "items",
            EmbeddedUpdate::new(delta(json!({"Sword": {"qty": 1}}))).keyed_by("label"),
        );
        let restore = delta(json!({"embedded": {"items": {"-=Sword": null}}}));
        let entry = m.stack_entry(restore, true).unwrap();
        assert_eq!(entry.comparison_keys.get("items").map(String::as_str), Some("label"));
    }

    #[test]
    fn from_entry_splits_embedded_inverses() {
        let mut entry = StackEntry::new(
            MutationKind::default(),
            delta(json!({"hp": 3, "embedded": {"items": {"-=Sword": null}}})),
        )
        .with_name("loot");
        entry.comparison_keys.insert("items".into(), "label".into());

        let m = Mutation::from_entry(doc(), &entry);
        assert!(m.is_permanent());
        assert_eq!(m.id(), entry.id);
        assert_eq!(m.name(), Some("loot"));
        assert_eq!(m.update(), &delta(json!({"hp": 3})));
        let items = &m.get_embedded()["items"];
        assert_eq!(items.comparison_key, "label");
        assert!(items.shorthand.get("Sword").unwrap().is_delete());
    }

    #[test]
    fn context_hides_id_of_permanent_mutations() {
        let m = Mutation::new(doc());
        assert_eq!(m.context(CallbackStage::PreMutate).mutation_id, Some(m.id()));
        let m = m.permanent();
        assert_eq!(m.context(CallbackStage::PreMutate).mutation_id, None);
    }
}
