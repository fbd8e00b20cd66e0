//! Error types for the delta crate.

/// Errors that can occur while building or applying deltas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    /// A key path is malformed or collides with the path syntax.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A delta or document was expected to be a JSON object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl DeltaError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for delta results.
pub type DeltaResult<T> = Result<T, DeltaError>;
