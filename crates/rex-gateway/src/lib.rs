//! REX Gateway
//!
//! The contract between the exploration engine and the backend that holds
//! the metadata:
//! - [`RepositoryGateway`]: async retrieval, traversal and search calls
//! - [`TypeCatalog`]: read-only type name -> guid lookup
//! - [`MemoryRepository`]: an in-memory repository implementing both,
//!   loadable from a JSON fixture
//!
//! # Example
//!
//! ```rust,ignore
//! use rex_gateway::{InstanceRequest, MemoryRepository, RepositoryGateway};
//!
//! let repo = MemoryRepository::from_json_str(FIXTURE)?;
//! let response = repo.fetch_entity(&InstanceRequest::new(server, guid)).await?;
//! println!("{}", response.digest.label);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod memory;

// Re-exports
pub use catalog::{MemoryTypeCatalog, TypeCatalog};
pub use error::{FixtureError, GatewayError};
pub use gateway::{
    EntityResponse, GatewayOperation, InstanceRequest, PreTraversalRequest, RelationshipResponse,
    RepositoryGateway, SearchRequest, SearchResponse, TraversalRequest, TraversalResponse,
};
pub use memory::{MemoryRepository, RepositoryFixture, StoredEntity, StoredRelationship};

#[cfg(any(test, feature = "mock"))]
pub use gateway::MockRepositoryGateway;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
