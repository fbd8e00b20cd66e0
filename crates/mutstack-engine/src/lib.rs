//! Mutation engine for mutstack.
//!
//! Applies [`Mutation`]s to [`Document`]s, records each one on the
//! document's [`MutationStack`], and reverts any recorded entry later,
//! following links into other documents.
//!
//! ```
//! use std::sync::Arc;
//!
//! use mutstack_engine::memory::{InMemoryDocument, InMemoryEmbeddedStore};
//! use mutstack_engine::{Delta, DocumentUuid, EngineConfig, Mutation, MutationEngine, Selector};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let engine = MutationEngine::new(EngineConfig::immediate(), Arc::new(InMemoryEmbeddedStore::new()));
//! let uuid = DocumentUuid::parse("Actor.hero").unwrap();
//! let doc = InMemoryDocument::from_json(uuid.clone(), json!({"hp": 10}));
//!
//! let heal = Mutation::new(uuid).with_update(Delta::from_json(&json!({"hp": 20})).unwrap());
//! engine.apply(&doc, &heal).await.unwrap();
//! assert_eq!(doc.data()["hp"], json!(20));
//!
//! engine.revert(&doc, &Selector::Latest).await.unwrap();
//! assert_eq!(doc.data()["hp"], json!(10));
//! # });
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod kind;
pub mod memory;
pub mod mutation;
pub mod traits;

pub use config::EngineConfig;
pub use engine::{ApplyOutcome, ApplyReport, LinkRevert, MutationEngine, RevertOutcome, RevertReport};
pub use error::{EngineError, EngineResult};
pub use global::{install, installed};
pub use kind::{KindRegistry, MutationFactory, PlainMutationFactory};
pub use mutation::{EmbeddedUpdate, Mutation, DEFAULT_COMPARISON_KEY, EMBEDDED_KEY};
pub use traits::{
    Document, DocumentUpdate, EmbeddedResolver, HistoryWrite, IdentityResolver, RemoteResult,
    RemoteReverter, UpdateOptions,
};

// Re-export key types
pub use mutstack_delta::{Delta, DeltaNode};
pub use mutstack_hooks::{callback_fn, CallbackStage, MutationCallback, StageContext, Verdict};
pub use mutstack_stack::{Link, MutationStack, Selector, StackEntry};
pub use mutstack_types::{DocumentUuid, MutationId, MutationKind};
