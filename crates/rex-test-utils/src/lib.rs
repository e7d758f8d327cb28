//! Testing utilities for the REX workspace
//!
//! Shared fixtures, a scripted gateway and a recording observer.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rex_engine::{ExplorationEngine, ExplorationEvent, ExplorationObserver, ExplorerConfig};
use rex_gateway::{
    EntityResponse, GatewayError, GatewayOperation, InstanceRequest, MemoryRepository,
    PreTraversalRequest, RelationshipResponse, RepositoryGateway, SearchRequest, SearchResponse,
    TraversalRequest, TraversalResponse,
};
use rex_types::{
    Guid, InstanceDigest, PreTraversalStats, RelationshipEnds, ServerContext, TypeCount,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub const SERVER_NAME: &str = "cocoMDS1";
pub const SERVER_URL: &str = "https://localhost:9443";
pub const REPOSITORY_ID: &str = "repo-home";

/// Small glossary: G1 anchors T1 and T2; T1 relates to T3 (remote) and T4.
pub const SAMPLE_FIXTURE: &str = r#"{
    "local_repository_id": "repo-home",
    "entity_types": [
        {"name": "Glossary", "guid": "t-glossary"},
        {"name": "GlossaryTerm", "guid": "t-term"}
    ],
    "relationship_types": [
        {"name": "TermAnchor", "guid": "t-anchor"},
        {"name": "RelatedTerm", "guid": "t-related"}
    ],
    "classifications": ["Confidentiality"],
    "entities": [
        {"guid": "G1", "type_name": "Glossary", "label": "Coco Glossary"},
        {"guid": "T1", "type_name": "GlossaryTerm", "label": "Customer",
         "classifications": ["Confidentiality"], "properties": {"summary": "a buyer"}},
        {"guid": "T2", "type_name": "GlossaryTerm", "label": "Supplier"},
        {"guid": "T3", "type_name": "GlossaryTerm", "label": "Remote Term",
         "home_repository_id": "repo-remote"},
        {"guid": "T4", "type_name": "GlossaryTerm", "label": "Customer Account"}
    ],
    "relationships": [
        {"guid": "R1", "type_name": "TermAnchor", "end1": "G1", "end2": "T1"},
        {"guid": "R2", "type_name": "TermAnchor", "end1": "G1", "end2": "T2"},
        {"guid": "R3", "type_name": "RelatedTerm", "end1": "T1", "end2": "T3"},
        {"guid": "R4", "type_name": "RelatedTerm", "end1": "T1", "end2": "T4"}
    ]
}"#;

// ---- Values ----

pub fn guid(value: &str) -> Guid {
    Guid::new(value).unwrap()
}

pub fn server() -> ServerContext {
    ServerContext::new(SERVER_NAME, SERVER_URL)
}

pub fn other_server() -> ServerContext {
    ServerContext::new("cocoMDS2", "https://localhost:9444")
}

pub fn entity(id: &str, label: &str) -> InstanceDigest {
    InstanceDigest::new(guid(id), label, "GlossaryTerm", REPOSITORY_ID)
}

pub fn relationship(id: &str, end1: &str, end2: &str) -> InstanceDigest {
    InstanceDigest::new(guid(id), id, "RelatedTerm", REPOSITORY_ID)
        .with_ends(RelationshipEnds::new(guid(end1), guid(end2)))
}

pub fn entity_response(id: &str, label: &str) -> EntityResponse {
    EntityResponse {
        digest: entity(id, label),
        expanded_detail: serde_json::json!({ "guid": id, "label": label }),
    }
}

pub fn relationship_response(id: &str, end1: &str, end2: &str) -> RelationshipResponse {
    RelationshipResponse {
        digest: relationship(id, end1, end2),
        end1: entity(end1, end1),
        end2: entity(end2, end2),
        expanded_detail: serde_json::json!({ "guid": id }),
    }
}

/// Traversal response over the given entity and (id, end1, end2) relationship guids
pub fn traversal_response(entities: &[&str], relationships: &[(&str, &str, &str)]) -> TraversalResponse {
    TraversalResponse {
        entities: entities
            .iter()
            .map(|id| (guid(id), entity(id, id)))
            .collect(),
        relationships: relationships
            .iter()
            .map(|(id, end1, end2)| (guid(id), relationship(id, end1, end2)))
            .collect(),
    }
}

pub fn search_response(entities: &[&str]) -> SearchResponse {
    SearchResponse {
        candidates: entities
            .iter()
            .map(|id| (guid(id), entity(id, id)))
            .collect(),
        ..SearchResponse::default()
    }
}

/// Relationship search response over (id, end1, end2), carrying the end digests
pub fn relationship_search_response(relationships: &[(&str, &str, &str)]) -> SearchResponse {
    let mut response = SearchResponse::default();
    for (id, end1, end2) in relationships {
        response
            .candidates
            .insert(guid(id), relationship(id, end1, end2));
        for end in [end1, end2] {
            response.ends.insert(guid(end), entity(end, end));
        }
    }
    response
}

pub fn stats(root: &str, entity_types: &[(&str, u64)], relationship_types: &[(&str, u64)]) -> PreTraversalStats {
    let mut stats = PreTraversalStats::new(guid(root), 1);
    for (name, count) in entity_types {
        stats.per_entity_type.insert(
            (*name).to_string(),
            TypeCount {
                count: *count,
                type_guid: format!("t-{name}"),
            },
        );
    }
    for (name, count) in relationship_types {
        stats.per_relationship_type.insert(
            (*name).to_string(),
            TypeCount {
                count: *count,
                type_guid: format!("t-{name}"),
            },
        );
    }
    stats
}

// ---- Engines ----

pub fn sample_repository() -> Arc<MemoryRepository> {
    Arc::new(MemoryRepository::from_json_str(SAMPLE_FIXTURE).unwrap())
}

/// Engine over the sample repository, connected to [`server`]
pub fn sample_engine(config: ExplorerConfig) -> (ExplorationEngine, Arc<MemoryRepository>) {
    let repository = sample_repository();
    let engine = ExplorationEngine::new(
        repository.clone(),
        Arc::new(repository.catalog().clone()),
        config,
    );
    engine.connect(server()).unwrap();
    (engine, repository)
}

/// Engine over `gateway` with an empty catalog, connected to [`server`]
pub fn engine_over(gateway: Arc<dyn RepositoryGateway>, config: ExplorerConfig) -> ExplorationEngine {
    let engine = ExplorationEngine::new(
        gateway,
        Arc::new(rex_gateway::MemoryTypeCatalog::new()),
        config,
    );
    engine.connect(server()).unwrap();
    engine
}

// ---- Recording observer ----

#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ExplorationEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ExplorationEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ExplorationEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn take(&self) -> Vec<ExplorationEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ExplorationObserver for RecordingObserver {
    fn on_event(&self, event: &ExplorationEvent) {
        self.events.lock().push(event.clone());
    }
}

// ---- Scripted gateway ----

#[derive(Debug)]
enum Reply {
    Entity(Result<EntityResponse, GatewayError>),
    Relationship(Result<RelationshipResponse, GatewayError>),
    PreTraversal(Result<PreTraversalStats, GatewayError>),
    Traversal(Result<TraversalResponse, GatewayError>),
    Search(Result<SearchResponse, GatewayError>),
}

/// A request held by the [`ScriptedGateway`] until the test answers it
#[derive(Debug)]
pub struct PendingCall {
    pub operation: GatewayOperation,
    pub server: ServerContext,
    /// Guid (retrieval, traversal) or search text
    pub subject: String,
    reply: oneshot::Sender<Reply>,
}

impl PendingCall {
    pub fn reply_entity(self, response: EntityResponse) {
        self.send(Reply::Entity(Ok(response)));
    }

    pub fn reply_relationship(self, response: RelationshipResponse) {
        self.send(Reply::Relationship(Ok(response)));
    }

    pub fn reply_stats(self, stats: PreTraversalStats) {
        self.send(Reply::PreTraversal(Ok(stats)));
    }

    pub fn reply_traversal(self, response: TraversalResponse) {
        self.send(Reply::Traversal(Ok(response)));
    }

    pub fn reply_search(self, response: SearchResponse) {
        self.send(Reply::Search(Ok(response)));
    }

    /// Fail the call, whatever its operation
    pub fn fail(self, error: GatewayError) {
        let reply = match self.operation {
            GatewayOperation::FetchEntity => Reply::Entity(Err(error)),
            GatewayOperation::FetchRelationship => Reply::Relationship(Err(error)),
            GatewayOperation::PreTraversal => Reply::PreTraversal(Err(error)),
            GatewayOperation::Traversal => Reply::Traversal(Err(error)),
            GatewayOperation::SearchEntities | GatewayOperation::SearchRelationships => {
                Reply::Search(Err(error))
            }
        };
        self.send(reply);
    }

    fn send(self, reply: Reply) {
        // The engine task may have been dropped; nothing to deliver then.
        let _ = self.reply.send(reply);
    }
}

/// Receiving end for calls made through a [`ScriptedGateway`]
#[derive(Debug)]
pub struct GatewayScript {
    calls: mpsc::UnboundedReceiver<PendingCall>,
}

impl GatewayScript {
    /// Wait for the next call
    pub async fn next_call(&mut self) -> PendingCall {
        self.calls.recv().await.expect("scripted gateway dropped")
    }

    /// Whether a call is already waiting
    pub fn try_next_call(&mut self) -> Option<PendingCall> {
        self.calls.try_recv().ok()
    }
}

/// Gateway whose calls block until the test answers them, in any order
#[derive(Debug, Clone)]
pub struct ScriptedGateway {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl ScriptedGateway {
    pub fn new() -> (Self, GatewayScript) {
        let (calls, receiver) = mpsc::unbounded_channel();
        (Self { calls }, GatewayScript { calls: receiver })
    }

    async fn call(&self, operation: GatewayOperation, server: &ServerContext, subject: String) -> Reply {
        let (reply, answer) = oneshot::channel();
        let pending = PendingCall {
            operation,
            server: server.clone(),
            subject,
            reply,
        };
        if self.calls.send(pending).is_err() {
            return Reply::Search(Err(GatewayError::Transport("script closed".into())));
        }
        answer
            .await
            .unwrap_or_else(|_| Reply::Search(Err(GatewayError::Transport("call abandoned".into()))))
    }
}

fn mismatch(operation: GatewayOperation) -> GatewayError {
    GatewayError::Transport(format!("scripted reply does not match {operation}"))
}

fn failure(reply: Reply, operation: GatewayOperation) -> GatewayError {
    match reply {
        Reply::Entity(Err(e))
        | Reply::Relationship(Err(e))
        | Reply::PreTraversal(Err(e))
        | Reply::Traversal(Err(e))
        | Reply::Search(Err(e)) => e,
        _ => mismatch(operation),
    }
}

#[async_trait]
impl RepositoryGateway for ScriptedGateway {
    async fn fetch_entity(&self, request: &InstanceRequest) -> Result<EntityResponse, GatewayError> {
        let operation = GatewayOperation::FetchEntity;
        match self.call(operation, &request.server, request.guid.to_string()).await {
            Reply::Entity(result) => result,
            other => Err(failure(other, operation)),
        }
    }

    async fn fetch_relationship(
        &self,
        request: &InstanceRequest,
    ) -> Result<RelationshipResponse, GatewayError> {
        let operation = GatewayOperation::FetchRelationship;
        match self.call(operation, &request.server, request.guid.to_string()).await {
            Reply::Relationship(result) => result,
            other => Err(failure(other, operation)),
        }
    }

    async fn pre_traversal(
        &self,
        request: &PreTraversalRequest,
    ) -> Result<PreTraversalStats, GatewayError> {
        let operation = GatewayOperation::PreTraversal;
        match self
            .call(operation, &request.server, request.entity_guid.to_string())
            .await
        {
            Reply::PreTraversal(result) => result,
            other => Err(failure(other, operation)),
        }
    }

    async fn traversal(&self, request: &TraversalRequest) -> Result<TraversalResponse, GatewayError> {
        let operation = GatewayOperation::Traversal;
        match self
            .call(operation, &request.server, request.entity_guid.to_string())
            .await
        {
            Reply::Traversal(result) => result,
            other => Err(failure(other, operation)),
        }
    }

    async fn search_entities(&self, request: &SearchRequest) -> Result<SearchResponse, GatewayError> {
        let operation = GatewayOperation::SearchEntities;
        match self
            .call(operation, &request.server, request.search_text.clone())
            .await
        {
            Reply::Search(result) => result,
            other => Err(failure(other, operation)),
        }
    }

    async fn search_relationships(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, GatewayError> {
        let operation = GatewayOperation::SearchRelationships;
        match self
            .call(operation, &request.server, request.search_text.clone())
            .await
        {
            Reply::Search(result) => result,
            other => Err(failure(other, operation)),
        }
    }
}
