//! REX Engine
//!
//! Generation-indexed exploration of a remote metadata repository.
//!
//! # Overview
//!
//! An [`ExplorationEngine`] incrementally discovers a graph of entities and
//! relationships through a [`RepositoryGateway`](rex_gateway::RepositoryGateway):
//!
//! - **Retrieval**: fetch one instance and make it the focus
//! - **Traversal**: expand from the focus entity, optionally filtered by the
//!   type counts a pre-traversal returned
//! - **Search**: find candidates, then commit a chosen subset
//! - **Undo**: two-phase removal of the most recent generation
//! - **Clear**: reset and supersede every in-flight request
//!
//! Every commit adds one generation holding only instances that were not
//! known before. Observers are notified after each state transition.
//!
//! # Example
//!
//! ```rust,ignore
//! use rex_engine::prelude::*;
//!
//! let engine = ExplorationEngine::with_defaults(gateway, catalog);
//! engine.connect(ServerContext::new("cocoMDS1", "https://localhost:9443"))?;
//!
//! engine.get_instance("E1", InstanceCategory::Entity).await?;
//! let stats = engine.pre_traversal("E1", 1).await?;
//! engine.traversal("E1", 1, TraversalFilter::unfiltered()).await?;
//!
//! for entry in engine.history() {
//!     println!("{}: {}", entry.index, entry.description);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod merge;
pub mod session;
pub mod state;

// Re-exports
pub use config::ExplorerConfig;
pub use engine::{ExplorationEngine, SearchResults, SearchSelection};
pub use error::{ConfigError, ExploreError, ValidationError};
pub use events::{
    ChannelObserver, ExplorationEvent, ExplorationObserver, ObserverRegistry, SubscriptionId,
};
pub use history::{HistoryEntry, HistoryItem};
pub use merge::{CandidateSet, MergeOutcome};
pub use session::{RequestId, RequestTicket, SessionGuard};
pub use state::{ExplorationState, Generation, InvariantViolation, OperationParams, PoppedGeneration};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving an exploration
    pub use crate::{
        ExplorationEngine, ExplorationEvent, ExplorationObserver, ExploreError, ExplorerConfig,
        HistoryEntry, MergeOutcome, ValidationError,
    };
    pub use rex_types::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
