//! Repository gateway contract
//!
//! Every request carries the [`ServerContext`] it was issued against. A
//! successful call returns a normalized response; a failed call returns a
//! [`GatewayError`]. Timeouts are the gateway's concern and surface as
//! [`GatewayError::Timeout`].

use crate::error::GatewayError;
use async_trait::async_trait;
use indexmap::IndexMap;
use rex_types::{
    GenerationIndex, Guid, InstanceDigest, PreTraversalStats, ServerContext, TraversalFilter,
    TypeRef,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway operations (for logging and fault injection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayOperation {
    /// Retrieve one entity
    FetchEntity,
    /// Retrieve one relationship and its ends
    FetchRelationship,
    /// Count a prospective traversal
    PreTraversal,
    /// Expand from an entity
    Traversal,
    /// Search entities
    SearchEntities,
    /// Search relationships
    SearchRelationships,
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchEntity => "fetch-entity",
            Self::FetchRelationship => "fetch-relationship",
            Self::PreTraversal => "pre-traversal",
            Self::Traversal => "traversal",
            Self::SearchEntities => "search-entities",
            Self::SearchRelationships => "search-relationships",
        };
        f.write_str(name)
    }
}

/// Retrieve a single instance by guid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRequest {
    /// Target server
    pub server: ServerContext,
    /// Instance guid
    pub guid: Guid,
}

impl InstanceRequest {
    /// Create request
    #[must_use]
    pub fn new(server: ServerContext, guid: Guid) -> Self {
        Self { server, guid }
    }
}

/// Count what a traversal would return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreTraversalRequest {
    /// Target server
    pub server: ServerContext,
    /// Root entity
    pub entity_guid: Guid,
    /// Traversal depth
    pub depth: u32,
}

/// Expand from an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalRequest {
    /// Target server
    pub server: ServerContext,
    /// Root entity
    pub entity_guid: Guid,
    /// Traversal depth
    pub depth: u32,
    /// Type and classification filters
    pub filter: TraversalFilter,
    /// Generation current at issue time, for server-side tagging
    pub generation: GenerationIndex,
}

/// Free-text search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Target server
    pub server: ServerContext,
    /// Search expression
    pub search_text: String,
    /// Restrict results to one type
    pub type_filter: Option<TypeRef>,
}

/// Result of an entity retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityResponse {
    /// Entity digest
    pub digest: InstanceDigest,
    /// Full entity payload
    pub expanded_detail: serde_json::Value,
}

/// Result of a relationship retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipResponse {
    /// Relationship digest (with ends)
    pub digest: InstanceDigest,
    /// Digest of end 1
    pub end1: InstanceDigest,
    /// Digest of end 2
    pub end2: InstanceDigest,
    /// Full relationship payload
    pub expanded_detail: serde_json::Value,
}

/// Result of a traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalResponse {
    /// Entities reached
    #[serde(default)]
    pub entities: IndexMap<Guid, InstanceDigest>,
    /// Relationships reached
    #[serde(default)]
    pub relationships: IndexMap<Guid, InstanceDigest>,
}

/// Result of a search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Matching instances
    #[serde(default)]
    pub candidates: IndexMap<Guid, InstanceDigest>,
    /// End entities of relationship candidates
    #[serde(default)]
    pub ends: IndexMap<Guid, InstanceDigest>,
}

/// Backend access used by the exploration engine
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Retrieve an entity
    async fn fetch_entity(&self, request: &InstanceRequest) -> Result<EntityResponse, GatewayError>;

    /// Retrieve a relationship together with its two end entities
    async fn fetch_relationship(
        &self,
        request: &InstanceRequest,
    ) -> Result<RelationshipResponse, GatewayError>;

    /// Count, by type, what a traversal would reach
    async fn pre_traversal(
        &self,
        request: &PreTraversalRequest,
    ) -> Result<PreTraversalStats, GatewayError>;

    /// Expand from an entity
    async fn traversal(
        &self,
        request: &TraversalRequest,
    ) -> Result<TraversalResponse, GatewayError>;

    /// Search entities
    async fn search_entities(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError>;

    /// Search relationships
    async fn search_relationships(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError>;
}
