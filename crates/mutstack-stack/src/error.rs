//! Error types for stack operations.

use thiserror::Error;

use mutstack_types::{DocumentUuid, MutationId};

/// Failures reported by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the write as malformed.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No document is known under this uuid.
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentUuid),
}

/// Errors that can occur during stack operations.
#[derive(Debug, Error)]
pub enum StackError {
    /// An entry with this id is already on the stack.
    #[error("duplicate mutation id {id} on document {document}")]
    DuplicateId {
        document: DocumentUuid,
        id: MutationId,
    },

    /// The persistence collaborator failed.
    #[error("history store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for stack operations.
pub type StackResult<T> = std::result::Result<T, StackError>;
