//! Foundation types for mutstack.
//!
//! Every other mutstack crate depends on `mutstack-types`.
//!
//! # Key Types
//!
//! - [`MutationId`] — UUID v7 identifier of one applied mutation
//! - [`DocumentUuid`] — Identity of a document a mutation targets or links to
//! - [`MutationKind`] — Tag naming the mutation variant that produced a stack entry

pub mod error;
pub mod ids;

pub use error::TypeError;
pub use ids::{DocumentUuid, MutationId, MutationKind};
