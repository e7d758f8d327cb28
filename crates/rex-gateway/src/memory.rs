//! In-memory repository gateway
//!
//! Holds a small instance graph (entities, relationships, type catalog) and
//! answers gateway calls against it. Used by the console for offline
//! exploration and by tests as a well-behaved backend.
//!
//! Scoping: when a request is not enterprise-scoped, only instances homed in
//! the repository's local metadata collection are visible.

use crate::catalog::{MemoryTypeCatalog, TypeCatalog};
use crate::error::{FixtureError, GatewayError};
use crate::gateway::{
    EntityResponse, GatewayOperation, InstanceRequest, PreTraversalRequest, RelationshipResponse,
    RepositoryGateway, SearchRequest, SearchResponse, TraversalRequest, TraversalResponse,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use rex_types::{
    ClassificationCount, Guid, InstanceCategory, InstanceDigest, PreTraversalStats,
    RelationshipEnds, ServerContext, TraversalFilter, TypeCount, TypeRef,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;

/// Default local metadata collection id when a fixture does not name one
const DEFAULT_LOCAL_REPOSITORY: &str = "local";

/// Entity as stored in the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Entity guid
    pub guid: Guid,
    /// Type name
    pub type_name: String,
    /// Display label
    pub label: String,
    /// Home metadata collection, defaults to the local repository
    #[serde(default)]
    pub home_repository_id: Option<String>,
    /// Classification names
    #[serde(default)]
    pub classifications: Vec<String>,
    /// Instance properties
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Relationship as stored in the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRelationship {
    /// Relationship guid
    pub guid: Guid,
    /// Type name
    pub type_name: String,
    /// Display label, defaults to the type name
    #[serde(default)]
    pub label: Option<String>,
    /// Home metadata collection, defaults to the local repository
    #[serde(default)]
    pub home_repository_id: Option<String>,
    /// End 1 entity
    pub end1: Guid,
    /// End 2 entity
    pub end2: Guid,
    /// Instance properties
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Serialized form of a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryFixture {
    /// Local metadata collection id
    #[serde(default)]
    pub local_repository_id: Option<String>,
    /// Declared entity types
    #[serde(default)]
    pub entity_types: Vec<TypeRef>,
    /// Declared relationship types
    #[serde(default)]
    pub relationship_types: Vec<TypeRef>,
    /// Declared classifications
    #[serde(default)]
    pub classifications: Vec<String>,
    /// Entities
    #[serde(default)]
    pub entities: Vec<StoredEntity>,
    /// Relationships
    #[serde(default)]
    pub relationships: Vec<StoredRelationship>,
}

/// Repository gateway answering from memory
#[derive(Debug)]
pub struct MemoryRepository {
    local_repository_id: String,
    catalog: MemoryTypeCatalog,
    entities: IndexMap<Guid, StoredEntity>,
    relationships: IndexMap<Guid, StoredRelationship>,
    /// entity guid -> relationship guids touching it
    adjacency: HashMap<Guid, Vec<Guid>>,
    faults: Mutex<HashMap<GatewayOperation, VecDeque<GatewayError>>>,
    latency: Option<Duration>,
}

impl MemoryRepository {
    /// Build a repository from a fixture
    ///
    /// # Errors
    /// Returns [`FixtureError`] on duplicate guids, undeclared types or
    /// relationships whose ends are missing.
    pub fn from_fixture(fixture: RepositoryFixture) -> Result<Self, FixtureError> {
        let mut catalog = MemoryTypeCatalog::new();
        for t in fixture.entity_types {
            catalog = catalog.with_entity_type(t);
        }
        for t in fixture.relationship_types {
            catalog = catalog.with_relationship_type(t);
        }
        for c in fixture.classifications {
            catalog = catalog.with_classification(c);
        }

        let mut entities = IndexMap::with_capacity(fixture.entities.len());
        for entity in fixture.entities {
            if catalog.entity_type(&entity.type_name).is_none() {
                return Err(FixtureError::UndeclaredType {
                    guid: entity.guid,
                    type_name: entity.type_name,
                });
            }
            if entities.contains_key(&entity.guid) {
                return Err(FixtureError::DuplicateGuid(entity.guid));
            }
            entities.insert(entity.guid.clone(), entity);
        }

        let mut relationships = IndexMap::with_capacity(fixture.relationships.len());
        let mut adjacency: HashMap<Guid, Vec<Guid>> = HashMap::new();
        for rel in fixture.relationships {
            if catalog.relationship_type(&rel.type_name).is_none() {
                return Err(FixtureError::UndeclaredType {
                    guid: rel.guid,
                    type_name: rel.type_name,
                });
            }
            if relationships.contains_key(&rel.guid) || entities.contains_key(&rel.guid) {
                return Err(FixtureError::DuplicateGuid(rel.guid));
            }
            for end in [&rel.end1, &rel.end2] {
                if !entities.contains_key(end) {
                    return Err(FixtureError::DanglingEnd {
                        relationship: rel.guid.clone(),
                        end: end.clone(),
                    });
                }
            }
            adjacency.entry(rel.end1.clone()).or_default().push(rel.guid.clone());
            if rel.end2 != rel.end1 {
                adjacency.entry(rel.end2.clone()).or_default().push(rel.guid.clone());
            }
            relationships.insert(rel.guid.clone(), rel);
        }

        Ok(Self {
            local_repository_id: fixture
                .local_repository_id
                .unwrap_or_else(|| DEFAULT_LOCAL_REPOSITORY.to_string()),
            catalog,
            entities,
            relationships,
            adjacency,
            faults: Mutex::new(HashMap::new()),
            latency: None,
        })
    }

    /// Parse a JSON fixture
    ///
    /// # Errors
    /// Returns [`FixtureError::Json`] for malformed input, or any validation error.
    pub fn from_json_str(json: &str) -> Result<Self, FixtureError> {
        let fixture: RepositoryFixture = serde_json::from_str(json)?;
        Self::from_fixture(fixture)
    }

    /// Load a JSON fixture from disk
    ///
    /// # Errors
    /// Returns [`FixtureError::Io`] if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Delay every response by `latency`
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: GatewayOperation, error: GatewayError) {
        self.faults.lock().entry(operation).or_default().push_back(error);
    }

    /// The repository's type catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &MemoryTypeCatalog {
        &self.catalog
    }

    /// Local metadata collection id
    #[inline]
    #[must_use]
    pub fn local_repository_id(&self) -> &str {
        &self.local_repository_id
    }

    /// Entity guids in fixture order
    pub fn entity_guids(&self) -> impl Iterator<Item = &Guid> {
        self.entities.keys()
    }

    /// Relationship guids in fixture order
    pub fn relationship_guids(&self) -> impl Iterator<Item = &Guid> {
        self.relationships.keys()
    }

    /// Number of stored entities
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored relationships
    #[inline]
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    async fn begin(&self, operation: GatewayOperation) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let fault = self
            .faults
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => {
                tracing::debug!(%operation, %error, "injected gateway fault");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn home_of<'a>(&'a self, home: Option<&'a String>) -> &'a str {
        home.map_or(self.local_repository_id.as_str(), String::as_str)
    }

    fn in_scope(&self, server: &ServerContext, home: Option<&String>) -> bool {
        server.enterprise_option || self.home_of(home) == self.local_repository_id
    }

    fn visible_entity(&self, server: &ServerContext, guid: &Guid) -> Option<&StoredEntity> {
        self.entities
            .get(guid)
            .filter(|e| self.in_scope(server, e.home_repository_id.as_ref()))
    }

    fn visible_relationship(
        &self,
        server: &ServerContext,
        guid: &Guid,
    ) -> Option<&StoredRelationship> {
        self.relationships
            .get(guid)
            .filter(|r| self.in_scope(server, r.home_repository_id.as_ref()))
    }

    fn entity_digest(&self, entity: &StoredEntity) -> InstanceDigest {
        InstanceDigest::new(
            entity.guid.clone(),
            entity.label.clone(),
            entity.type_name.clone(),
            self.home_of(entity.home_repository_id.as_ref()),
        )
    }

    fn relationship_digest(&self, rel: &StoredRelationship) -> InstanceDigest {
        InstanceDigest::new(
            rel.guid.clone(),
            rel.label.clone().unwrap_or_else(|| rel.type_name.clone()),
            rel.type_name.clone(),
            self.home_of(rel.home_repository_id.as_ref()),
        )
        .with_ends(RelationshipEnds::new(rel.end1.clone(), rel.end2.clone()))
    }

    fn entity_detail(&self, entity: &StoredEntity) -> Value {
        json!({
            "guid": entity.guid,
            "category": InstanceCategory::Entity,
            "typeName": entity.type_name,
            "label": entity.label,
            "homeRepositoryId": self.home_of(entity.home_repository_id.as_ref()),
            "classifications": entity.classifications,
            "properties": entity.properties,
        })
    }

    fn relationship_detail(&self, rel: &StoredRelationship) -> Value {
        json!({
            "guid": rel.guid,
            "category": InstanceCategory::Relationship,
            "typeName": rel.type_name,
            "label": rel.label.as_deref().unwrap_or(&rel.type_name),
            "homeRepositoryId": self.home_of(rel.home_repository_id.as_ref()),
            "end1": rel.end1,
            "end2": rel.end2,
            "properties": rel.properties,
        })
    }

    fn type_guid(&self, type_name: &str) -> String {
        self.catalog.type_guid(type_name).unwrap_or_default().to_string()
    }

    fn entity_passes(&self, entity: &StoredEntity, filter: &TraversalFilter) -> bool {
        let type_ok = filter.entity_types.is_empty()
            || filter
                .entity_types
                .iter()
                .any(|t| t.name == entity.type_name || t.guid == self.type_guid(&entity.type_name));
        let class_ok = filter.classifications.is_empty()
            || entity
                .classifications
                .iter()
                .any(|c| filter.classifications.contains(c));
        type_ok && class_ok
    }

    fn relationship_passes(&self, rel: &StoredRelationship, filter: &TraversalFilter) -> bool {
        filter.relationship_types.is_empty()
            || filter
                .relationship_types
                .iter()
                .any(|t| t.name == rel.type_name || t.guid == self.type_guid(&rel.type_name))
    }

    /// Breadth-first neighbourhood of `root`, root included.
    ///
    /// A neighbour that fails the entity filter is not reached, and neither is
    /// the relationship leading to it.
    fn neighbourhood(
        &self,
        server: &ServerContext,
        root: &StoredEntity,
        depth: u32,
        filter: &TraversalFilter,
    ) -> TraversalResponse {
        let mut response = TraversalResponse::default();
        let mut visited: HashSet<&Guid> = HashSet::new();
        visited.insert(&root.guid);
        response
            .entities
            .insert(root.guid.clone(), self.entity_digest(root));

        let mut frontier: Vec<&Guid> = vec![&root.guid];
        for _ in 0..depth {
            let mut next = Vec::new();
            for guid in frontier {
                let Some(rel_guids) = self.adjacency.get(guid) else {
                    continue;
                };
                for rel_guid in rel_guids {
                    let Some(rel) = self.visible_relationship(server, rel_guid) else {
                        continue;
                    };
                    if !self.relationship_passes(rel, filter) {
                        continue;
                    }
                    let other = if &rel.end1 == guid { &rel.end2 } else { &rel.end1 };
                    let Some(neighbour) = self.visible_entity(server, other) else {
                        continue;
                    };
                    if other != &root.guid && !self.entity_passes(neighbour, filter) {
                        continue;
                    }
                    response
                        .relationships
                        .entry(rel.guid.clone())
                        .or_insert_with(|| self.relationship_digest(rel));
                    if visited.insert(&neighbour.guid) {
                        response
                            .entities
                            .insert(neighbour.guid.clone(), self.entity_digest(neighbour));
                        next.push(&neighbour.guid);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        response
    }

    fn search_regex(text: &str) -> Result<Regex, GatewayError> {
        RegexBuilder::new(text)
            .case_insensitive(true)
            .build()
            .map_err(|e| GatewayError::InvalidSearch(e.to_string()))
    }

    fn matches_text(regex: &Regex, label: &str, properties: &Map<String, Value>) -> bool {
        regex.is_match(label)
            || properties
                .values()
                .filter_map(Value::as_str)
                .any(|v| regex.is_match(v))
    }

    fn matches_type(&self, type_name: &str, filter: Option<&TypeRef>) -> bool {
        filter.map_or(true, |t| {
            t.name == type_name || t.guid == self.type_guid(type_name)
        })
    }
}

#[async_trait]
impl RepositoryGateway for MemoryRepository {
    async fn fetch_entity(&self, request: &InstanceRequest) -> Result<EntityResponse, GatewayError> {
        self.begin(GatewayOperation::FetchEntity).await?;
        let entity = self
            .visible_entity(&request.server, &request.guid)
            .ok_or_else(|| GatewayError::NotFound {
                category: InstanceCategory::Entity,
                guid: request.guid.clone(),
            })?;
        Ok(EntityResponse {
            digest: self.entity_digest(entity),
            expanded_detail: self.entity_detail(entity),
        })
    }

    async fn fetch_relationship(
        &self,
        request: &InstanceRequest,
    ) -> Result<RelationshipResponse, GatewayError> {
        self.begin(GatewayOperation::FetchRelationship).await?;
        let not_found = || GatewayError::NotFound {
            category: InstanceCategory::Relationship,
            guid: request.guid.clone(),
        };
        let rel = self
            .visible_relationship(&request.server, &request.guid)
            .ok_or_else(not_found)?;
        let end1 = self
            .visible_entity(&request.server, &rel.end1)
            .ok_or_else(not_found)?;
        let end2 = self
            .visible_entity(&request.server, &rel.end2)
            .ok_or_else(not_found)?;
        Ok(RelationshipResponse {
            digest: self.relationship_digest(rel),
            end1: self.entity_digest(end1),
            end2: self.entity_digest(end2),
            expanded_detail: self.relationship_detail(rel),
        })
    }

    async fn pre_traversal(
        &self,
        request: &PreTraversalRequest,
    ) -> Result<PreTraversalStats, GatewayError> {
        self.begin(GatewayOperation::PreTraversal).await?;
        let root = self
            .visible_entity(&request.server, &request.entity_guid)
            .ok_or_else(|| GatewayError::NotFound {
                category: InstanceCategory::Entity,
                guid: request.entity_guid.clone(),
            })?;
        let reached = self.neighbourhood(
            &request.server,
            root,
            request.depth,
            &TraversalFilter::unfiltered(),
        );

        let mut stats = PreTraversalStats::new(request.entity_guid.clone(), request.depth);
        for digest in reached.entities.values() {
            if digest.guid == root.guid {
                continue;
            }
            let type_guid = self.type_guid(&digest.type_name);
            stats
                .per_entity_type
                .entry(digest.type_name.clone())
                .or_insert(TypeCount {
                    count: 0,
                    type_guid,
                })
                .count += 1;
            if let Some(entity) = self.entities.get(&digest.guid) {
                for class in &entity.classifications {
                    stats
                        .per_classification
                        .entry(class.clone())
                        .or_insert(ClassificationCount { count: 0 })
                        .count += 1;
                }
            }
        }
        for digest in reached.relationships.values() {
            let type_guid = self.type_guid(&digest.type_name);
            stats
                .per_relationship_type
                .entry(digest.type_name.clone())
                .or_insert(TypeCount {
                    count: 0,
                    type_guid,
                })
                .count += 1;
        }
        Ok(stats)
    }

    async fn traversal(
        &self,
        request: &TraversalRequest,
    ) -> Result<TraversalResponse, GatewayError> {
        self.begin(GatewayOperation::Traversal).await?;
        let root = self
            .visible_entity(&request.server, &request.entity_guid)
            .ok_or_else(|| GatewayError::NotFound {
                category: InstanceCategory::Entity,
                guid: request.entity_guid.clone(),
            })?;
        let response = self.neighbourhood(&request.server, root, request.depth, &request.filter);
        tracing::debug!(
            root = %request.entity_guid,
            depth = request.depth,
            generation = %request.generation,
            entities = response.entities.len(),
            relationships = response.relationships.len(),
            "memory traversal"
        );
        Ok(response)
    }

    async fn search_entities(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError> {
        self.begin(GatewayOperation::SearchEntities).await?;
        let regex = Self::search_regex(&request.search_text)?;
        let candidates = self
            .entities
            .values()
            .filter(|e| self.in_scope(&request.server, e.home_repository_id.as_ref()))
            .filter(|e| self.matches_type(&e.type_name, request.type_filter.as_ref()))
            .filter(|e| Self::matches_text(&regex, &e.label, &e.properties))
            .map(|e| (e.guid.clone(), self.entity_digest(e)))
            .collect();
        Ok(SearchResponse {
            candidates,
            ends: IndexMap::new(),
        })
    }

    async fn search_relationships(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError> {
        self.begin(GatewayOperation::SearchRelationships).await?;
        let regex = Self::search_regex(&request.search_text)?;
        let mut response = SearchResponse::default();
        let matching = self
            .relationships
            .values()
            .filter(|r| self.in_scope(&request.server, r.home_repository_id.as_ref()))
            .filter(|r| self.matches_type(&r.type_name, request.type_filter.as_ref()))
            .filter(|r| {
                Self::matches_text(
                    &regex,
                    r.label.as_deref().unwrap_or(&r.type_name),
                    &r.properties,
                )
            });
        for rel in matching {
            // Same visibility as fetch_relationship: both ends must be in scope.
            let (Some(end1), Some(end2)) = (
                self.visible_entity(&request.server, &rel.end1),
                self.visible_entity(&request.server, &rel.end2),
            ) else {
                continue;
            };
            for end in [end1, end2] {
                response
                    .ends
                    .entry(end.guid.clone())
                    .or_insert_with(|| self.entity_digest(end));
            }
            response
                .candidates
                .insert(rel.guid.clone(), self.relationship_digest(rel));
        }
        Ok(response)
    }
}
