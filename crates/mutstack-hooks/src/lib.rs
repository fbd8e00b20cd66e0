//! Staged callback hooks for mutstack.
//!
//! Every mutation carries a [`CallbackRegistry`]: callbacks registered per
//! [`CallbackStage`]. The engine runs a whole stage at once. All callbacks of
//! a stage start together and the stage completes only when every one has
//! settled. A `PRE_*` stage is cancelled when any callback answers
//! [`Verdict::Cancel`]; `POST_*` stages are informational.
//!
//! # Quick Start
//!
//! ```rust
//! use mutstack_hooks::{callback_fn, CallbackRegistry, CallbackStage, StageContext, Verdict};
//! use mutstack_types::DocumentUuid;
//!
//! let mut hooks = CallbackRegistry::new();
//! hooks.register(
//!     CallbackStage::PreMutate,
//!     callback_fn("veto", |_ctx: &StageContext| Verdict::Cancel),
//! );
//! let ctx = StageContext::new(CallbackStage::PreMutate, DocumentUuid::parse("Actor.a").unwrap());
//! let report = futures::executor::block_on(hooks.call_all(&ctx));
//! assert!(report.cancelled());
//! ```

pub mod error;
pub mod registry;
pub mod stage;

pub use error::HookError;
pub use registry::{CallbackRegistry, StageReport};
pub use stage::{
    callback_fn, CallbackResult, CallbackStage, FnCallback, MutationCallback, StageContext,
    Verdict,
};
