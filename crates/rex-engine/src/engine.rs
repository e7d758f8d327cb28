//! The exploration engine
//!
//! Owns the exploration state for one server context and exposes the
//! retrieval, traversal, search, undo and clear operations. Each operation:
//!
//! 1. validates its inputs and captures a [`RequestTicket`] under the state lock
//! 2. awaits the gateway with the lock released
//! 3. re-acquires the lock, discards the response if the ticket went stale,
//!    otherwise applies the filter-then-commit merge in one step
//! 4. releases the lock and dispatches the resulting events
//!
//! Gateway failures leave the state untouched and are reported both as the
//! returned error and as a `*Failed` notification.

use crate::config::ExplorerConfig;
use crate::error::{ExploreError, ValidationError};
use crate::events::{ExplorationEvent, ExplorationObserver, ObserverRegistry, SubscriptionId};
use crate::history::{self, HistoryEntry};
use crate::merge::{CandidateSet, MergeOutcome};
use crate::session::{RequestTicket, SessionGuard};
use crate::state::{ExplorationState, Generation, OperationParams};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rex_gateway::{
    GatewayError, InstanceRequest, PreTraversalRequest, RepositoryGateway, SearchRequest,
    TraversalRequest, TypeCatalog,
};
use rex_types::{
    FocusInstance, GenerationIndex, Guid, InstanceCategory, InstanceDigest, OperationKind,
    PreTraversalStats, ServerContext, TraversalFilter, TypeRef,
};
use std::sync::Arc;
use tracing::Instrument;

#[derive(Debug, Default)]
struct EngineInner {
    state: ExplorationState,
    session: SessionGuard,
    /// Generation announced by `begin_undo` and not yet removed
    pending_undo: Option<GenerationIndex>,
}

/// Search candidates awaiting user selection
///
/// Not merged into the graph. Pick a subset with [`SearchResults::select`]
/// and hand it to [`ExplorationEngine::commit_search_selection`].
#[derive(Debug, Clone)]
pub struct SearchResults {
    ticket: RequestTicket,
    /// Searched category
    pub category: InstanceCategory,
    /// Search expression
    pub search_text: String,
    /// Resolved type restriction
    pub type_filter: Option<TypeRef>,
    /// Candidate digests, in gateway order
    pub candidates: Vec<InstanceDigest>,
    /// End entities of relationship candidates
    pub ends: IndexMap<Guid, InstanceDigest>,
}

impl SearchResults {
    /// Number of candidates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the search matched nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates whose guid is in `guids`, in candidate order
    #[must_use]
    pub fn select(&self, guids: &[Guid]) -> SearchSelection {
        let digests = self
            .candidates
            .iter()
            .filter(|digest| guids.contains(&digest.guid))
            .cloned()
            .collect();
        self.selection(digests)
    }

    /// Every candidate
    #[must_use]
    pub fn select_all(&self) -> SearchSelection {
        self.selection(self.candidates.clone())
    }

    fn selection(&self, digests: Vec<InstanceDigest>) -> SearchSelection {
        let ends = digests
            .iter()
            .filter_map(|digest| digest.ends.as_ref())
            .flat_map(|ends| [&ends.end1, &ends.end2])
            .filter_map(|guid| self.ends.get(guid))
            .cloned()
            .collect();
        SearchSelection {
            ticket: self.ticket.clone(),
            category: self.category,
            search_text: self.search_text.clone(),
            type_filter: self.type_filter.clone(),
            digests,
            ends,
        }
    }
}

/// Subset of search candidates chosen for commit
#[derive(Debug, Clone)]
pub struct SearchSelection {
    ticket: RequestTicket,
    category: InstanceCategory,
    search_text: String,
    type_filter: Option<TypeRef>,
    digests: Vec<InstanceDigest>,
    /// End entities of the selected relationships
    ends: Vec<InstanceDigest>,
}

impl SearchSelection {
    /// Selected digests
    #[inline]
    #[must_use]
    pub fn digests(&self) -> &[InstanceDigest] {
        &self.digests
    }

    /// Category of the selection
    #[inline]
    #[must_use]
    pub fn category(&self) -> InstanceCategory {
        self.category
    }

    /// Number of selected digests
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Whether nothing was selected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Retrieved instance, normalized across categories
struct Retrieved {
    candidates: CandidateSet,
    observed: Vec<InstanceDigest>,
    expanded_detail: serde_json::Value,
}

/// Generation-indexed exploration engine
pub struct ExplorationEngine {
    gateway: Arc<dyn RepositoryGateway>,
    catalog: Arc<dyn TypeCatalog>,
    config: ExplorerConfig,
    inner: Mutex<EngineInner>,
    observers: ObserverRegistry,
}

impl ExplorationEngine {
    /// Create an engine with no server context
    #[must_use]
    pub fn new(
        gateway: Arc<dyn RepositoryGateway>,
        catalog: Arc<dyn TypeCatalog>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            config,
            inner: Mutex::new(EngineInner::default()),
            observers: ObserverRegistry::new(),
        }
    }

    /// Create an engine with the default configuration
    #[must_use]
    pub fn with_defaults(gateway: Arc<dyn RepositoryGateway>, catalog: Arc<dyn TypeCatalog>) -> Self {
        Self::new(gateway, catalog, ExplorerConfig::default())
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    // ---- Notifications ----

    /// Register an observer
    pub fn subscribe(&self, observer: Arc<dyn ExplorationObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn emit(&self, events: &[ExplorationEvent]) {
        self.observers.dispatch(events);
    }

    // ---- Server context ----

    /// Target `server`, starting from an empty state
    ///
    /// Switching to a different context clears the state and invalidates
    /// every in-flight request. Reconnecting to the same context is a no-op.
    ///
    /// # Errors
    /// Returns [`ValidationError::IncompleteServer`] if the name or URL root is blank.
    pub fn connect(&self, server: ServerContext) -> Result<(), ValidationError> {
        if !server.is_complete() {
            return Err(ValidationError::IncompleteServer);
        }
        let cleared = {
            let mut inner = self.inner.lock();
            let had_server = inner.session.server().is_some();
            if !inner.session.connect(server.clone()) {
                return Ok(());
            }
            inner.state.clear();
            inner.pending_undo = None;
            had_server
        };
        tracing::info!(%server, "server context established");
        if cleared {
            self.emit(&[ExplorationEvent::GraphCleared]);
        }
        Ok(())
    }

    /// Drop the server context and clear the state
    pub fn disconnect(&self) {
        let had_server = {
            let mut inner = self.inner.lock();
            let had_server = inner.session.disconnect();
            inner.state.clear();
            inner.pending_undo = None;
            had_server
        };
        if had_server {
            tracing::info!("server context dropped");
            self.emit(&[ExplorationEvent::GraphCleared]);
        }
    }

    /// Current server context
    #[must_use]
    pub fn server_context(&self) -> Option<ServerContext> {
        self.inner.lock().session.server().cloned()
    }

    // ---- Retrieval ----

    /// Retrieve an instance and make it the focus
    ///
    /// An unknown guid is committed as a new generation (a relationship
    /// brings its unknown end entities into the same generation). A known
    /// guid keeps its generation; only its label and home repository are
    /// refreshed.
    ///
    /// # Errors
    /// Returns [`ValidationError`] for a blank guid or missing server, or
    /// [`GatewayError`] if retrieval fails.
    pub async fn get_instance(
        &self,
        guid: &str,
        category: InstanceCategory,
    ) -> Result<MergeOutcome, ExploreError> {
        let guid = Guid::new(guid).map_err(ValidationError::from)?;
        let ticket = self.issue()?;
        let span = tracing::info_span!(
            "get_instance",
            request_id = %ticket.id,
            %guid,
            %category,
        );
        self.retrieve(ticket, guid, category).instrument(span).await
    }

    async fn retrieve(
        &self,
        ticket: RequestTicket,
        guid: Guid,
        category: InstanceCategory,
    ) -> Result<MergeOutcome, ExploreError> {
        let request = InstanceRequest::new(ticket.server.clone(), guid.clone());
        let fetched = match category {
            InstanceCategory::Entity => {
                self.gateway
                    .fetch_entity(&request)
                    .await
                    .map(|response| Retrieved {
                        candidates: CandidateSet::from_selection(
                            category,
                            [response.digest.clone()],
                        ),
                        observed: vec![response.digest],
                        expanded_detail: response.expanded_detail,
                    })
            }
            InstanceCategory::Relationship => self
                .gateway
                .fetch_relationship(&request)
                .await
                .map(|response| {
                    let mut candidates = CandidateSet::new();
                    candidates.push(InstanceCategory::Relationship, response.digest.clone());
                    candidates.push(InstanceCategory::Entity, response.end1.clone());
                    candidates.push(InstanceCategory::Entity, response.end2.clone());
                    Retrieved {
                        candidates,
                        observed: vec![response.digest, response.end1, response.end2],
                        expanded_detail: response.expanded_detail,
                    }
                }),
        };

        let fetched = fetched.and_then(|retrieved| {
            let returned = retrieved.observed.first().map(|digest| digest.guid.clone());
            if returned.as_ref() == Some(&guid) {
                Ok(retrieved)
            } else {
                Err(GatewayError::UnexpectedInstance {
                    requested: guid.clone(),
                    returned,
                })
            }
        });
        let retrieved = match fetched {
            Ok(retrieved) => retrieved,
            Err(error) => {
                return self
                    .fail(&ticket, error, |message| {
                        ExplorationEvent::InstanceLoadFailed { category, message }
                    })
                    .map(|()| MergeOutcome::Discarded);
            }
        };

        let (outcome, events) = self.apply_retrieval(&ticket, guid, category, retrieved);
        self.emit(&events);
        Ok(outcome)
    }

    fn apply_retrieval(
        &self,
        ticket: &RequestTicket,
        guid: Guid,
        category: InstanceCategory,
        retrieved: Retrieved,
    ) -> (MergeOutcome, Vec<ExplorationEvent>) {
        let mut inner = self.inner.lock();
        if !inner.session.is_current(ticket) {
            tracing::debug!("stale retrieval discarded");
            return (MergeOutcome::Discarded, Vec::new());
        }

        let mut events = Vec::new();
        for digest in &retrieved.observed {
            inner.state.refresh(digest);
        }
        // A known instance keeps its generation, even if its ends are new.
        let outcome = if inner.state.contains(&guid) {
            MergeOutcome::Unchanged
        } else {
            let committed = inner.state.commit(
                OperationKind::retrieval(category),
                &ticket.server.server_name,
                OperationParams::Retrieval { guid: guid.clone() },
                retrieved.candidates,
            );
            match committed {
                Some(generation) => {
                    tracing::info!(%generation, "generation committed");
                    events.push(ExplorationEvent::GraphExtended { generation });
                    MergeOutcome::Extended(generation)
                }
                None => MergeOutcome::Unchanged,
            }
        };

        // The guid is indexed at this point, so the focus is always accepted.
        if inner.state.set_focus(FocusInstance {
            guid: guid.clone(),
            category,
            expanded_detail: retrieved.expanded_detail,
        }) {
            events.push(ExplorationEvent::FocusChanged { guid, category });
        }
        (outcome, events)
    }

    // ---- Traversal ----

    /// Fetch type-level counts for a prospective traversal
    ///
    /// The statistics are returned and announced with `preTraversalLoaded`;
    /// they are never merged into the state. `Ok(None)` means the response
    /// arrived for a superseded session.
    ///
    /// # Errors
    /// Returns [`ValidationError`] when the focus is missing, is not an
    /// entity or is not `entity_guid`, or the depth is out of range;
    /// [`GatewayError`] on failure.
    pub async fn pre_traversal(
        &self,
        entity_guid: &str,
        depth: u32,
    ) -> Result<Option<PreTraversalStats>, ExploreError> {
        let (ticket, entity_guid) = self.prepare_exploration(entity_guid, depth)?;
        let span = tracing::info_span!(
            "pre_traversal",
            request_id = %ticket.id,
            guid = %entity_guid,
            depth,
        );
        async move {
            let request = PreTraversalRequest {
                server: ticket.server.clone(),
                entity_guid,
                depth,
            };
            let stats = match self.gateway.pre_traversal(&request).await {
                Ok(stats) => stats,
                Err(error) => {
                    return self
                        .fail(&ticket, error, |message| {
                            ExplorationEvent::TraversalFailed { message }
                        })
                        .map(|()| None);
                }
            };
            if !self.inner.lock().session.is_current(&ticket) {
                tracing::debug!("stale pre-traversal discarded");
                return Ok(None);
            }
            self.emit(&[ExplorationEvent::PreTraversalLoaded {
                stats: stats.clone(),
            }]);
            Ok(Some(stats))
        }
        .instrument(span)
        .await
    }

    /// Build a traversal filter from pre-traversal stats and selected names
    ///
    /// # Errors
    /// Returns [`ValidationError::UnknownType`] for a name absent from `stats`.
    pub fn traversal_filter<S: AsRef<str>>(
        &self,
        stats: &PreTraversalStats,
        entity_types: &[S],
        relationship_types: &[S],
        classifications: &[S],
    ) -> Result<TraversalFilter, ValidationError> {
        TraversalFilter::from_stats(stats, entity_types, relationship_types, classifications)
            .map_err(ValidationError::from)
    }

    /// Expand from the focus entity and commit every instance not yet known
    ///
    /// When all returned instances are already known nothing is committed
    /// and `noNewObjects` is emitted.
    ///
    /// # Errors
    /// Returns [`ValidationError`] when the focus is missing, is not an
    /// entity or is not `entity_guid`, or the depth is out of range;
    /// [`GatewayError`] on failure.
    pub async fn traversal(
        &self,
        entity_guid: &str,
        depth: u32,
        filter: TraversalFilter,
    ) -> Result<MergeOutcome, ExploreError> {
        let (ticket, entity_guid) = self.prepare_exploration(entity_guid, depth)?;
        let span = tracing::info_span!(
            "traversal",
            request_id = %ticket.id,
            guid = %entity_guid,
            depth,
            generation = %ticket.generation,
        );
        async move {
            let request = TraversalRequest {
                server: ticket.server.clone(),
                entity_guid: entity_guid.clone(),
                depth,
                filter: filter.clone(),
                generation: ticket.generation,
            };
            let response = match self.gateway.traversal(&request).await {
                Ok(response) => response,
                Err(error) => {
                    return self
                        .fail(&ticket, error, |message| {
                            ExplorationEvent::TraversalFailed { message }
                        })
                        .map(|()| MergeOutcome::Discarded);
                }
            };
            let params = OperationParams::Traversal {
                root: entity_guid,
                depth,
                filter,
            };
            let (outcome, events) = self.apply_commit(
                &ticket,
                OperationKind::Traversal,
                params,
                CandidateSet::from(response),
            );
            self.emit(&events);
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    // ---- Search ----

    /// Search for candidate instances; nothing is committed
    ///
    /// `type_name` is resolved through the type catalog. `Ok(None)` means
    /// the response arrived for a superseded session.
    ///
    /// # Errors
    /// Returns [`ValidationError`] for blank text, an unknown type or a
    /// missing server; [`GatewayError`] on failure.
    pub async fn search(
        &self,
        category: InstanceCategory,
        search_text: &str,
        type_name: Option<&str>,
    ) -> Result<Option<SearchResults>, ExploreError> {
        if search_text.trim().is_empty() {
            return Err(ValidationError::BlankSearchText.into());
        }
        let type_filter = type_name
            .map(|name| self.resolve_type(category, name))
            .transpose()?;
        let ticket = self.issue()?;
        let span = tracing::info_span!(
            "search",
            request_id = %ticket.id,
            %category,
            search_text,
        );
        async move {
            let request = SearchRequest {
                server: ticket.server.clone(),
                search_text: search_text.to_string(),
                type_filter: type_filter.clone(),
            };
            let result = match category {
                InstanceCategory::Entity => self.gateway.search_entities(&request).await,
                InstanceCategory::Relationship => {
                    self.gateway.search_relationships(&request).await
                }
            };
            let response = match result {
                Ok(response) => response,
                Err(error) => {
                    return self
                        .fail(&ticket, error, |message| ExplorationEvent::SearchFailed {
                            category,
                            message,
                        })
                        .map(|()| None);
                }
            };
            if !self.inner.lock().session.is_current(&ticket) {
                tracing::debug!("stale search discarded");
                return Ok(None);
            }
            tracing::debug!(candidates = response.candidates.len(), "search complete");
            Ok(Some(SearchResults {
                ticket,
                category,
                search_text: search_text.to_string(),
                type_filter,
                candidates: response.candidates.into_values().collect(),
                ends: response.ends,
            }))
        }
        .instrument(span)
        .await
    }

    /// Commit selected search candidates as a new generation
    ///
    /// Selected relationships bring their unknown end entities into the same
    /// generation. Candidates already known are dropped first. When exactly one digest
    /// was selected (and the configuration allows it) the instance is then
    /// retrieved and focused; a failure of that retrieval is reported by
    /// notification only.
    pub async fn commit_search_selection(&self, selection: SearchSelection) -> MergeOutcome {
        let single = match selection.digests.as_slice() {
            [only] if self.config.focus_single_search_selection => Some(only.guid.clone()),
            _ => None,
        };
        let params = OperationParams::Search {
            search_text: selection.search_text,
            type_filter: selection.type_filter,
        };
        let mut candidates = CandidateSet::from_selection(selection.category, selection.digests);
        for end in selection.ends {
            candidates.push(InstanceCategory::Entity, end);
        }
        let (outcome, events) = self.apply_commit(
            &selection.ticket,
            OperationKind::search(selection.category),
            params,
            candidates,
        );
        self.emit(&events);

        if let Some(guid) = single.filter(|_| outcome != MergeOutcome::Discarded) {
            if let Err(error) = self.get_instance(guid.as_str(), selection.category).await {
                tracing::warn!(%guid, %error, "focus retrieval after search selection failed");
            }
        }
        outcome
    }

    // ---- Undo / clear ----

    /// Announce removal of the top generation (`graphBeingReduced`)
    ///
    /// State is not modified. Returns the generation that the next
    /// [`commit_undo`](Self::commit_undo) will remove.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyUndo`] on an empty stack when the
    /// configuration rejects empty undo; otherwise that case is `Ok(None)`.
    pub fn begin_undo(&self) -> Result<Option<GenerationIndex>, ValidationError> {
        let top = {
            let mut inner = self.inner.lock();
            let top = inner.state.top().cloned();
            inner.pending_undo = top.as_ref().map(|g| g.index);
            top
        };
        let Some(top) = top else {
            return self.empty_undo();
        };
        let index = top.index;
        self.emit(&[ExplorationEvent::GraphBeingReduced {
            generation: Box::new(top),
        }]);
        Ok(Some(index))
    }

    /// Remove the top generation
    ///
    /// Removes its guids from the index and clears the focus if it pointed
    /// into the generation. If the top generation was not announced by
    /// [`begin_undo`](Self::begin_undo), `graphBeingReduced` is emitted first.
    ///
    /// # Errors
    /// Same empty-stack behavior as [`begin_undo`](Self::begin_undo).
    pub fn commit_undo(&self) -> Result<Option<GenerationIndex>, ValidationError> {
        let mut events = Vec::new();
        let popped = {
            let mut inner = self.inner.lock();
            let announced = inner.pending_undo.take();
            let Some(top) = inner.state.top() else {
                return self.empty_undo();
            };
            if announced != Some(top.index) {
                events.push(ExplorationEvent::GraphBeingReduced {
                    generation: Box::new(top.clone()),
                });
            }
            inner.state.pop()
        };
        let Some(popped) = popped else {
            return self.empty_undo();
        };

        let index = popped.generation.index;
        tracing::info!(generation = %index, instances = popped.generation.len(), "generation removed");
        if popped.focus_cleared {
            events.push(ExplorationEvent::FocusCleared);
        }
        events.push(ExplorationEvent::GraphReduced { generation: index });
        self.emit(&events);
        Ok(Some(index))
    }

    /// Both undo phases back to back
    ///
    /// # Errors
    /// Same empty-stack behavior as [`begin_undo`](Self::begin_undo).
    pub fn undo(&self) -> Result<Option<GenerationIndex>, ValidationError> {
        if self.begin_undo()?.is_none() {
            return Ok(None);
        }
        self.commit_undo()
    }

    fn empty_undo(&self) -> Result<Option<GenerationIndex>, ValidationError> {
        if self.config.reject_empty_undo {
            Err(ValidationError::EmptyUndo)
        } else {
            tracing::debug!("undo on empty stack ignored");
            Ok(None)
        }
    }

    /// Reset to the empty state and supersede every in-flight request
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state.clear();
            inner.session.invalidate();
            inner.pending_undo = None;
        }
        tracing::info!("exploration cleared");
        self.emit(&[ExplorationEvent::GraphCleared]);
    }

    // ---- Read accessors ----

    /// Guid of the focus instance
    #[must_use]
    pub fn focus_guid(&self) -> Option<Guid> {
        self.inner.lock().state.focus().map(|f| f.guid.clone())
    }

    /// Focus instance with its expanded detail
    #[must_use]
    pub fn focus(&self) -> Option<FocusInstance> {
        self.inner.lock().state.focus().cloned()
    }

    /// Index of the top generation
    #[must_use]
    pub fn current_generation(&self) -> GenerationIndex {
        self.inner.lock().state.current_generation()
    }

    /// Generation by index
    #[must_use]
    pub fn generation(&self, index: GenerationIndex) -> Option<Generation> {
        self.inner.lock().state.generation(index).cloned()
    }

    /// Generation that introduced `guid`
    #[must_use]
    pub fn generation_of(&self, guid: &Guid) -> Option<GenerationIndex> {
        self.inner.lock().state.generation_of(guid)
    }

    /// Digest of a known instance, with its category
    #[must_use]
    pub fn digest(&self, guid: &Guid) -> Option<(InstanceCategory, InstanceDigest)> {
        self.inner
            .lock()
            .state
            .digest(guid)
            .map(|(category, digest)| (category, digest.clone()))
    }

    /// Whether `guid` is known
    #[must_use]
    pub fn contains(&self, guid: &Guid) -> bool {
        self.inner.lock().state.contains(guid)
    }

    /// Number of known instances
    #[must_use]
    pub fn known_count(&self) -> usize {
        self.inner.lock().state.known_count()
    }

    /// Copy of the whole state
    #[must_use]
    pub fn snapshot(&self) -> ExplorationState {
        self.inner.lock().state.clone()
    }

    /// History projection, oldest generation first
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        history::project(&self.inner.lock().state)
    }

    // ---- Internals ----

    fn issue(&self) -> Result<RequestTicket, ValidationError> {
        let inner = self.inner.lock();
        inner.session.issue(inner.state.current_generation())
    }

    fn check_depth(&self, depth: u32) -> Result<(), ValidationError> {
        let max = self.config.max_traversal_depth;
        if depth == 0 || depth > max {
            return Err(ValidationError::InvalidDepth { depth, max });
        }
        Ok(())
    }

    /// Validate a pre-traversal or traversal and capture its ticket
    fn prepare_exploration(
        &self,
        entity_guid: &str,
        depth: u32,
    ) -> Result<(RequestTicket, Guid), ValidationError> {
        let entity_guid = Guid::new(entity_guid)?;
        self.check_depth(depth)?;

        let inner = self.inner.lock();
        let ticket = inner.session.issue(inner.state.current_generation())?;
        let focus = inner.state.focus().ok_or(ValidationError::NoFocus)?;
        if !focus.is_entity() {
            return Err(ValidationError::FocusNotEntity {
                guid: focus.guid.clone(),
            });
        }
        if focus.guid != entity_guid {
            return Err(ValidationError::NotFocus {
                requested: entity_guid,
                focus: focus.guid.clone(),
            });
        }
        Ok((ticket, entity_guid))
    }

    fn resolve_type(
        &self,
        category: InstanceCategory,
        name: &str,
    ) -> Result<TypeRef, ValidationError> {
        let resolved = match category {
            InstanceCategory::Entity => self.catalog.entity_type(name),
            InstanceCategory::Relationship => self.catalog.relationship_type(name),
        };
        resolved.ok_or_else(|| ValidationError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Filter-then-commit under the lock; stale tickets change nothing
    fn apply_commit(
        &self,
        ticket: &RequestTicket,
        operation: OperationKind,
        params: OperationParams,
        candidates: CandidateSet,
    ) -> (MergeOutcome, Vec<ExplorationEvent>) {
        let mut inner = self.inner.lock();
        if !inner.session.is_current(ticket) {
            tracing::debug!(%operation, "stale response discarded");
            return (MergeOutcome::Discarded, Vec::new());
        }
        let offered = candidates.len();
        match inner
            .state
            .commit(operation, &ticket.server.server_name, params, candidates)
        {
            Some(generation) => {
                let added = inner.state.generation(generation).map_or(0, Generation::len);
                tracing::info!(%operation, %generation, offered, added, "generation committed");
                (
                    MergeOutcome::Extended(generation),
                    vec![ExplorationEvent::GraphExtended { generation }],
                )
            }
            None => {
                tracing::info!(%operation, offered, "no new objects");
                (MergeOutcome::Unchanged, vec![ExplorationEvent::NoNewObjects])
            }
        }
    }

    /// Report a gateway failure, unless the request went stale meanwhile
    ///
    /// `Ok(())` means the failure belonged to a superseded session and was dropped.
    fn fail(
        &self,
        ticket: &RequestTicket,
        error: GatewayError,
        event: impl FnOnce(String) -> ExplorationEvent,
    ) -> Result<(), ExploreError> {
        if !self.inner.lock().session.is_current(ticket) {
            tracing::debug!(%error, "failure of stale request discarded");
            return Ok(());
        }
        tracing::warn!(%error, retryable = error.is_retryable(), "gateway call failed");
        self.emit(&[event(error.message())]);
        Err(error.into())
    }
}

impl std::fmt::Debug for ExplorationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExplorationEngine")
            .field("server", &inner.session.server())
            .field("epoch", &inner.session.epoch())
            .field("current_generation", &inner.state.current_generation())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
