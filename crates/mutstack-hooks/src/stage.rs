use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mutstack_delta::Delta;
use mutstack_types::{DocumentUuid, MutationId};

use crate::error::HookError;

// ---------------------------------------------------------------------------
// CallbackStage
// ---------------------------------------------------------------------------

/// The points in an apply or revert at which callbacks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStage {
    PreMutate,
    PostMutate,
    PreRevert,
    PostRevert,
}

impl CallbackStage {
    pub const ALL: [CallbackStage; 4] = [
        Self::PreMutate,
        Self::PostMutate,
        Self::PreRevert,
        Self::PostRevert,
    ];

    /// Returns `true` for the `PRE_*` stages, which may veto the operation.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::PreMutate | Self::PreRevert)
    }
}

impl fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreMutate => write!(f, "PRE_MUTATE"),
            Self::PostMutate => write!(f, "POST_MUTATE"),
            Self::PreRevert => write!(f, "PRE_REVERT"),
            Self::PostRevert => write!(f, "POST_REVERT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// What a callback answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed.
    Continue,
    /// Veto the operation. Only honored during `PRE_*` stages.
    Cancel,
    /// An informational value, returned to the caller untouched.
    Value(serde_json::Value),
}

impl Verdict {
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel)
    }
}

impl From<bool> for Verdict {
    fn from(proceed: bool) -> Self {
        if proceed {
            Self::Continue
        } else {
            Self::Cancel
        }
    }
}

impl From<()> for Verdict {
    fn from(_: ()) -> Self {
        Self::Continue
    }
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// What a callback is told about the operation it is observing.
#[derive(Clone, Debug)]
pub struct StageContext {
    pub stage: CallbackStage,
    pub document: DocumentUuid,
    /// Stack entry id: the one being created on apply, the one being
    /// reverted on revert. `None` for permanent mutations.
    pub mutation_id: Option<MutationId>,
    pub name: Option<String>,
    /// The top-level field update about to be (or just) written.
    pub update: Delta,
}

impl StageContext {
    /// A minimal context (useful for tests).
    pub fn new(stage: CallbackStage, document: DocumentUuid) -> Self {
        Self {
            stage,
            document,
            mutation_id: None,
            name: None,
            update: Delta::new(),
        }
    }

    /// The same operation seen from another stage.
    pub fn at(&self, stage: CallbackStage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// CallbackResult
// ---------------------------------------------------------------------------

/// Recorded result of one callback invocation.
#[derive(Clone, Debug)]
pub struct CallbackResult {
    pub stage: CallbackStage,
    pub callback: String,
    pub outcome: Result<Verdict, HookError>,
    /// Wall-clock time the callback took to settle.
    pub elapsed: Duration,
}

impl CallbackResult {
    /// Returns `true` if this callback vetoed a cancellable stage.
    pub fn vetoed(&self) -> bool {
        self.stage.is_cancellable() && matches!(self.outcome, Ok(Verdict::Cancel))
    }
}

// ---------------------------------------------------------------------------
// MutationCallback trait
// ---------------------------------------------------------------------------

/// A callback run at one [`CallbackStage`].
///
/// The trait is object-safe and `Send + Sync` so callbacks can be stored as
/// `Arc<dyn MutationCallback>` and shared between a mutation and its revert.
#[async_trait]
pub trait MutationCallback: Send + Sync {
    /// Name used in logs and results.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn call(&self, context: &StageContext) -> Result<Verdict, HookError>;
}

/// Adapter turning a synchronous closure into a [`MutationCallback`].
pub struct FnCallback<F> {
    name: String,
    func: F,
}

/// Wrap a closure returning anything convertible into a [`Verdict`].
pub fn callback_fn<F, R>(name: impl Into<String>, func: F) -> FnCallback<F>
where
    F: Fn(&StageContext) -> R + Send + Sync,
    R: Into<Verdict>,
{
    FnCallback {
        name: name.into(),
        func,
    }
}

#[async_trait]
impl<F, R> MutationCallback for FnCallback<F>
where
    F: Fn(&StageContext) -> R + Send + Sync,
    R: Into<Verdict>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: &StageContext) -> Result<Verdict, HookError> {
        Ok((self.func)(context).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StageContext {
        StageContext::new(CallbackStage::PreMutate, DocumentUuid::parse("Actor.a").unwrap())
    }

    #[test]
    fn cancellable_stages() {
        assert!(CallbackStage::PreMutate.is_cancellable());
        assert!(CallbackStage::PreRevert.is_cancellable());
        assert!(!CallbackStage::PostMutate.is_cancellable());
        assert!(!CallbackStage::PostRevert.is_cancellable());
    }

    #[test]
    fn verdict_from_bool() {
        assert_eq!(Verdict::from(true), Verdict::Continue);
        assert_eq!(Verdict::from(false), Verdict::Cancel);
        assert_eq!(Verdict::from(()), Verdict::Continue);
    }

    #[test]
    fn stage_display_names() {
        assert_eq!(CallbackStage::PreMutate.to_string(), "PRE_MUTATE");
        assert_eq!(CallbackStage::PostRevert.to_string(), "POST_REVERT");
    }

    #[tokio::test]
    async fn closure_callback_reports_its_name() {
        let cb = callback_fn("count", |c: &StageContext| c.update.is_empty());
        assert_eq!(cb.name(), "count");
        assert_eq!(cb.call(&ctx()).await.unwrap(), Verdict::Continue);
    }

    #[test]
    fn post_stage_cancel_is_not_a_veto() {
        let result = CallbackResult {
            stage: CallbackStage::PostMutate,
            callback: "late".into(),
            outcome: Ok(Verdict::Cancel),
            elapsed: Duration::ZERO,
        };
        assert!(!result.vetoed());
        let pre = CallbackResult {
            stage: CallbackStage::PreMutate,
            ..result
        };
        assert!(pre.vetoed());
    }
}
