use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, warn};

use mutstack_delta::{effective_update, restore_for, Delta, DeltaNode};
use mutstack_hooks::{CallbackResult, CallbackStage};
use mutstack_stack::{Link, MutationStack, Selector, StackEntry};
use mutstack_types::DocumentUuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::kind::KindRegistry;
use crate::mutation::{Mutation, EMBEDDED_KEY};
use crate::traits::{
    Document, DocumentUpdate, EmbeddedResolver, HistoryWrite, IdentityResolver, RemoteResult,
    RemoteReverter,
};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What [`MutationEngine::apply`] did.
#[derive(Clone, Debug)]
pub enum ApplyOutcome {
    /// A `PRE_MUTATE` callback vetoed the mutation; nothing was written.
    Cancelled,
    Applied(ApplyReport),
}

impl ApplyOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            Self::Applied(report) => Some(report),
            Self::Cancelled => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApplyReport {
    /// The top-level write, whether or not it was performed.
    pub update: DocumentUpdate,
    /// `false` when no top-level write was issued. A revert that restores
    /// no fields stores its shortened history on its own.
    pub wrote: bool,
    /// Embedded collections written to, in write order.
    pub embedded: Vec<String>,
    /// The entry pushed onto the stack, if any.
    pub entry: Option<StackEntry>,
    /// `PRE_MUTATE` then `POST_MUTATE` results.
    pub callbacks: Vec<CallbackResult>,
}

/// What [`MutationEngine::revert`] did.
#[derive(Debug)]
pub enum RevertOutcome {
    /// A `PRE_REVERT` or `PRE_MUTATE` callback vetoed the revert; the stack
    /// was left as it was.
    Cancelled,
    /// No entry matched the selector.
    NotFound {
        document: DocumentUuid,
        selector: Selector,
    },
    /// The acting party does not own the document; the revert was handed
    /// to the remote reverter.
    Requested(RemoteResult),
    Reverted(RevertReport),
}

impl RevertOutcome {
    pub fn is_reverted(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }

    pub fn report(&self) -> Option<&RevertReport> {
        match self {
            Self::Reverted(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct RevertReport {
    /// The removed entry, carrying only the fields it still owned.
    pub entry: StackEntry,
    /// The inverse write.
    pub apply: ApplyReport,
    /// One result per link, in link order.
    pub links: Vec<LinkRevert>,
    /// `PRE_REVERT` then `POST_REVERT` results.
    pub callbacks: Vec<CallbackResult>,
}

impl RevertReport {
    /// Links whose revert failed.
    pub fn failed_links(&self) -> impl Iterator<Item = &LinkRevert> {
        self.links.iter().filter(|l| l.outcome.is_err())
    }
}

/// The result of following one link during a cascading revert.
#[derive(Debug)]
pub struct LinkRevert {
    pub link: Link,
    pub outcome: Result<RevertOutcome, EngineError>,
}

// ---------------------------------------------------------------------------
// MutationEngine
// ---------------------------------------------------------------------------

/// Applies mutations and reverts stack entries against [`Document`]s.
pub struct MutationEngine {
    config: EngineConfig,
    kinds: KindRegistry,
    embedded: Arc<dyn EmbeddedResolver>,
    identity: Option<Arc<dyn IdentityResolver>>,
    remote: Option<Arc<dyn RemoteReverter>>,
}

impl MutationEngine {
    pub fn new(config: EngineConfig, embedded: Arc<dyn EmbeddedResolver>) -> Self {
        Self {
            config,
            kinds: KindRegistry::new(),
            embedded,
            identity: None,
            remote: None,
        }
    }

    /// Resolver used to follow links during a cascading revert.
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteReverter>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_kinds(mut self, kinds: KindRegistry) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    // ---- Inspection ----

    /// The persisted stack of `document`.
    pub async fn history(&self, document: &dyn Document) -> EngineResult<MutationStack> {
        let stack =
            MutationStack::load(document, document.uuid().clone(), &self.config.namespace).await?;
        Ok(stack)
    }

    // ---- Apply ----

    /// Apply `mutation` to `document`.
    ///
    /// Runs `PRE_MUTATE`, writes embedded collections one at a time, then
    /// writes the effective field changes together with the updated stack.
    /// The top-level write is skipped when it would be empty. `POST_MUTATE`
    /// runs whenever `PRE_MUTATE` did not cancel.
    pub async fn apply(
        &self,
        document: &dyn Document,
        mutation: &Mutation,
    ) -> EngineResult<ApplyOutcome> {
        self.write(document, mutation, None).await
    }

    /// Shared by [`apply`](Self::apply) and reverts. With `replacement`, that
    /// stack is stored in the same update as the fields instead of a new
    /// entry being pushed.
    async fn write(
        &self,
        document: &dyn Document,
        mutation: &Mutation,
        replacement: Option<&MutationStack>,
    ) -> EngineResult<ApplyOutcome> {
        let uuid = document.uuid();
        if mutation.document() != uuid {
            return Err(EngineError::DocumentMismatch {
                expected: mutation.document().clone(),
                actual: uuid.clone(),
            });
        }
        if mutation.update().get(EMBEDDED_KEY).is_some() {
            return Err(EngineError::ReservedField(EMBEDDED_KEY.to_string()));
        }

        let context = mutation.context(CallbackStage::PreMutate);
        let pre = mutation.call_all(&context).await;
        if pre.cancelled() {
            info!(doc = %uuid, mutation = %mutation.id(), "mutation cancelled by callback");
            return Ok(ApplyOutcome::Cancelled);
        }

        let snapshot = document.snapshot().await?;
        let (update, options) = mutation.get_update();
        let fields = effective_update(&snapshot, update);
        let mut restore = restore_for(&snapshot, update);

        let mut embedded = Vec::new();
        let mut inverses = Delta::new();
        for (collection, embedded_update) in mutation.get_embedded() {
            if embedded_update.shorthand.is_empty() {
                continue;
            }
            debug!(doc = %uuid, %collection, "writing embedded collection");
            let inverse = self
                .embedded
                .perform(document, collection, embedded_update)
                .await?;
            embedded.push(collection.clone());
            if !inverse.is_empty() {
                inverses.insert(collection.clone(), DeltaNode::Nested(inverse));
            }
        }
        if !inverses.is_empty() {
            restore.insert(EMBEDDED_KEY, DeltaNode::Nested(inverses));
        }

        let (history, entry) = match replacement {
            Some(stack) => {
                let write = HistoryWrite {
                    namespace: self.config.namespace.clone(),
                    entries: stack.entries().to_vec(),
                };
                (Some(write), None)
            }
            None if mutation.is_permanent() => (None, None),
            None => {
                let stack = self.history(document).await?;
                let write = mutation.update_mutation_stack(
                    &stack,
                    restore,
                    document.is_owner(),
                    &self.config.namespace,
                )?;
                let entry = write.as_ref().and_then(|w| w.entries.last().cloned());
                (write, entry)
            }
        };

        let update = DocumentUpdate { fields, history };
        let wrote = if update.is_empty() {
            debug!(doc = %uuid, mutation = %mutation.id(), "nothing to write");
            false
        } else {
            if !embedded.is_empty() && !self.config.settle_delay.is_zero() {
                tokio::time::sleep(self.config.settle_delay).await;
            }
            match (&update.history, replacement) {
                (Some(history), Some(_)) if update.fields.is_empty() => {
                    debug!(doc = %uuid, entries = history.entries.len(), "storing history only");
                    history.persist(document).await?;
                    false
                }
                _ => {
                    document.update(&update, options).await?;
                    true
                }
            }
        };

        let post = mutation
            .call_all(&context.at(CallbackStage::PostMutate))
            .await;

        if let Some(entry) = &entry {
            info!(doc = %uuid, entry = %entry.label(), "mutation applied");
        }

        let mut callbacks = pre.results;
        callbacks.extend(post.results);
        Ok(ApplyOutcome::Applied(ApplyReport {
            update,
            wrote,
            embedded,
            entry,
            callbacks,
        }))
    }

    // ---- Revert ----

    /// Revert the entry `selector` picks on `document`, then every mutation
    /// it links to.
    ///
    /// The entry may sit anywhere in the stack; its overlapping fields are
    /// handed to newer entries first. A failing link is recorded in the
    /// report and does not stop the other links or this revert.
    pub async fn revert(
        &self,
        document: &dyn Document,
        selector: &Selector,
    ) -> EngineResult<RevertOutcome> {
        self.revert_at(document, selector.clone(), 0).await
    }

    /// Revert `document`'s entries newest first until the stack is empty or
    /// a revert does not complete.
    pub async fn revert_all(&self, document: &dyn Document) -> EngineResult<Vec<RevertOutcome>> {
        let mut outcomes = Vec::new();
        loop {
            if self.history(document).await?.is_empty() {
                break;
            }
            let outcome = self.revert(document, &Selector::Latest).await?;
            let done = !outcome.is_reverted();
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        Ok(outcomes)
    }

    fn revert_at<'a>(
        &'a self,
        document: &'a dyn Document,
        selector: Selector,
        depth: usize,
    ) -> BoxFuture<'a, EngineResult<RevertOutcome>> {
        async move {
            let uuid = document.uuid().clone();
            let mut stack = self.history(document).await?;

            let Some(index) = stack.position(&selector) else {
                error!(doc = %uuid, %selector, "could not locate mutation to revert");
                return Ok(RevertOutcome::NotFound {
                    document: uuid,
                    selector,
                });
            };

            let target = &stack.entries()[index];
            if !target.owner {
                return Err(EngineError::PermissionDenied {
                    document: uuid,
                    entry: target.label(),
                    reason: "entry was not recorded by an owner".into(),
                });
            }
            if !document.is_owner() {
                return match &self.remote {
                    Some(remote) if self.config.remote_revert => {
                        info!(doc = %uuid, entry = %target.label(), "handing revert to the document owner");
                        let result = remote.request_revert(&uuid, target.id).await?;
                        Ok(RevertOutcome::Requested(result))
                    }
                    _ => Err(EngineError::PermissionDenied {
                        document: uuid,
                        entry: target.label(),
                        reason: "acting party does not own the document".into(),
                    }),
                };
            }

            let Some((entry, mutation)) = self.kinds.from_stack(&mut stack, index) else {
                return Ok(RevertOutcome::NotFound {
                    document: uuid,
                    selector,
                });
            };

            // Revert callbacks see the entry being reverted, not the permanent write.
            let mut context = mutation.context(CallbackStage::PreRevert);
            context.mutation_id = Some(entry.id);
            let pre = mutation.call_all(&context).await;
            if pre.cancelled() {
                info!(doc = %uuid, entry = %entry.label(), "revert cancelled by callback");
                return Ok(RevertOutcome::Cancelled);
            }

            let apply = match self.write(document, &mutation, Some(&stack)).await? {
                ApplyOutcome::Applied(report) => report,
                ApplyOutcome::Cancelled => {
                    info!(doc = %uuid, entry = %entry.label(), "revert write cancelled by callback");
                    return Ok(RevertOutcome::Cancelled);
                }
            };
            info!(doc = %uuid, entry = %entry.label(), remaining = stack.len(), "mutation reverted");

            let mut links = Vec::with_capacity(entry.links.len());
            for link in &entry.links {
                let outcome = self.revert_link(link, depth + 1).await;
                if let Err(e) = &outcome {
                    warn!(doc = %uuid, link = %link.uuid, mutation = %link.mutation_id, error = %e, "linked revert failed");
                }
                links.push(LinkRevert {
                    link: link.clone(),
                    outcome,
                });
            }

            let post = mutation
                .call_all(&context.at(CallbackStage::PostRevert))
                .await;

            let mut callbacks = pre.results;
            callbacks.extend(post.results);
            Ok(RevertOutcome::Reverted(RevertReport {
                entry,
                apply,
                links,
                callbacks,
            }))
        }
        .boxed()
    }

    async fn revert_link(&self, link: &Link, depth: usize) -> EngineResult<RevertOutcome> {
        if depth > self.config.max_link_depth {
            return Err(EngineError::LinkDepthExceeded {
                document: link.uuid.clone(),
                max: self.config.max_link_depth,
            });
        }
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| EngineError::NoIdentityResolver(link.uuid.clone()))?;
        let linked = identity.resolve(&link.uuid).await?;
        debug!(doc = %link.uuid, mutation = %link.mutation_id, depth, "following link");
        self.revert_at(linked.as_ref(), Selector::Id(link.mutation_id), depth)
            .await
    }
}

impl std::fmt::Debug for MutationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationEngine")
            .field("config", &self.config)
            .field("kinds", &self.kinds)
            .field("identity", &self.identity.is_some())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}
