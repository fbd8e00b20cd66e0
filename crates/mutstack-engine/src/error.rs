use thiserror::Error;

use mutstack_delta::DeltaError;
use mutstack_stack::{StackError, StoreError};
use mutstack_types::DocumentUuid;

/// Errors produced by the mutation engine.
///
/// Cancellation and "not found" are not errors; they are reported through
/// [`ApplyOutcome`](crate::ApplyOutcome) and
/// [`RevertOutcome`](crate::RevertOutcome).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("permission denied reverting {entry} on {document}: {reason}")]
    PermissionDenied {
        document: DocumentUuid,
        entry: String,
        reason: String,
    },

    #[error("mutation targets {expected} but was applied to {actual}")]
    DocumentMismatch {
        expected: DocumentUuid,
        actual: DocumentUuid,
    },

    #[error("field {0:?} is reserved for embedded collection history")]
    ReservedField(String),

    #[error("link to {document} exceeds the maximum link depth of {max}")]
    LinkDepthExceeded { document: DocumentUuid, max: usize },

    #[error("no identity resolver configured to follow link to {0}")]
    NoIdentityResolver(DocumentUuid),

    #[error("a mutation engine is already installed")]
    AlreadyInstalled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("stack error: {0}")]
    Stack(#[from] StackError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
