use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::stage::{CallbackResult, CallbackStage, MutationCallback, StageContext};

// ---------------------------------------------------------------------------
// StageReport
// ---------------------------------------------------------------------------

/// The settled results of one stage, in registration order.
#[derive(Clone, Debug)]
pub struct StageReport {
    pub stage: CallbackStage,
    pub results: Vec<CallbackResult>,
}

impl StageReport {
    /// Returns `true` if the stage is cancellable and any callback vetoed it.
    pub fn cancelled(&self) -> bool {
        self.results.iter().any(CallbackResult::vetoed)
    }

    /// Number of callbacks that returned an error.
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

// ---------------------------------------------------------------------------
// CallbackRegistry
// ---------------------------------------------------------------------------

/// Callbacks of one mutation, grouped by stage in registration order.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    stages: BTreeMap<CallbackStage, Vec<Arc<dyn MutationCallback>>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback to the end of a stage.
    pub fn register<C>(&mut self, stage: CallbackStage, callback: C)
    where
        C: MutationCallback + 'static,
    {
        self.register_shared(stage, Arc::new(callback));
    }

    /// Append an already shared callback to the end of a stage.
    pub fn register_shared(&mut self, stage: CallbackStage, callback: Arc<dyn MutationCallback>) {
        self.stages.entry(stage).or_default().push(callback);
    }

    /// Append every callback of `other`, stage by stage.
    pub fn extend(&mut self, other: &CallbackRegistry) {
        for (stage, callbacks) in &other.stages {
            self.stages
                .entry(*stage)
                .or_default()
                .extend(callbacks.iter().cloned());
        }
    }

    /// Number of callbacks registered for `stage`.
    pub fn count(&self, stage: CallbackStage) -> usize {
        self.stages.get(&stage).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.values().all(Vec::is_empty)
    }

    /// Run every callback of `context.stage` concurrently and wait for all
    /// of them to settle.
    ///
    /// A failing callback does not stop the others; its error is logged and
    /// kept in the report. Whether the stage was vetoed is left to the
    /// caller through [`StageReport::cancelled`].
    pub async fn call_all(&self, context: &StageContext) -> StageReport {
        let stage = context.stage;
        let callbacks = self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[]);
        if callbacks.is_empty() {
            return StageReport {
                stage,
                results: Vec::new(),
            };
        }

        debug!(%stage, doc = %context.document, count = callbacks.len(), "dispatching callbacks");

        let pending = callbacks.iter().map(|callback| async move {
            let started = Instant::now();
            let outcome = callback.call(context).await;
            CallbackResult {
                stage,
                callback: callback.name().to_string(),
                outcome,
                elapsed: started.elapsed(),
            }
        });
        let results = join_all(pending).await;

        for result in &results {
            if let Err(e) = &result.outcome {
                warn!(%stage, doc = %context.document, callback = %result.callback, error = %e, "callback failed");
            }
        }

        StageReport { stage, results }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (stage, callbacks) in &self.stages {
            let names: Vec<&str> = callbacks.iter().map(|c| c.name()).collect();
            map.entry(stage, &names);
        }
        map.finish()
    }
}
