//! REX Types
//!
//! Strongly-typed vocabulary shared by the exploration engine and its
//! collaborators.
//!
//! # Overview
//!
//! - **Guid**: non-blank identifier of an entity or relationship instance
//! - **GenerationIndex**: 1-based discovery batch number (0 = none yet)
//! - **InstanceDigest**: lightweight summary used by graph and history views
//! - **ServerContext**: coordinates of the targeted metadata server
//! - **PreTraversalStats** / **TraversalFilter**: the advisory stats that
//!   come back from a pre-traversal and the filters built from them
//!
//! # Example
//!
//! ```rust
//! use rex_types::{Guid, GenerationIndex, InstanceDigest};
//!
//! let guid = Guid::new("E1").unwrap();
//! let digest = InstanceDigest::new(guid, "Customer", "GlossaryTerm", "repo-1")
//!     .with_generation(GenerationIndex::FIRST);
//!
//! assert_eq!(digest.generation.get(), 1);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod ids;
pub mod instance;
pub mod server;
pub mod stats;

// Re-exports
pub use error::TypeError;
pub use ids::{GenerationIndex, Guid};
pub use instance::{FocusInstance, InstanceCategory, InstanceDigest, OperationKind, RelationshipEnds};
pub use server::ServerContext;
pub use stats::{ClassificationCount, PreTraversalStats, TraversalFilter, TypeCount, TypeRef};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for exploration types
    pub use crate::{
        FocusInstance, GenerationIndex, Guid, InstanceCategory, InstanceDigest, OperationKind,
        PreTraversalStats, ServerContext, TraversalFilter, TypeRef,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
