use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid mutation id: {0}")]
    InvalidMutationId(String),

    #[error("invalid document uuid: {0:?}")]
    InvalidDocumentUuid(String),

    #[error("invalid mutation kind: {0:?}")]
    InvalidKind(String),
}
