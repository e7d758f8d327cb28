//! REX Simulator - randomized exploration sessions
//!
//! Drives an engine over a generated in-memory repository with a seeded mix
//! of operations and checks the state after every step:
//! - the state passes `check_invariants`
//! - failed or rejected operations leave the state as it was
//! - a known entity is never committed again
//! - a committed generation follows the previous top and holds only new guids
//! - undo removes exactly the top generation
//! - clear and server switch leave the state empty, even with a retrieval in flight
//! - a selection from a superseded search is never committed

use rand::{rngs::StdRng, seq::IndexedRandom, Rng, SeedableRng};
use rex_engine::{
    ExplorationEngine, ExplorationState, ExploreError, ExplorerConfig, MergeOutcome, SearchResults,
};
use rex_gateway::{
    GatewayError, GatewayOperation, MemoryRepository, RepositoryFixture, StoredEntity,
    StoredRelationship,
};
use rex_types::{
    GenerationIndex, Guid, InstanceCategory, ServerContext, TraversalFilter, TypeError, TypeRef,
};
use serde_json::{json, Map};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

const ENTITY_TYPES: &[&str] = &["Glossary", "GlossaryTerm", "Asset"];
const RELATIONSHIP_TYPES: &[&str] = &["TermAnchor", "RelatedTerm", "SemanticAssignment"];
const CLASSIFICATIONS: &[&str] = &["Confidentiality", "Criticality"];
const WORDS: &[&str] = &[
    "Patient", "Trial", "Treatment", "Customer", "Supplier", "Invoice", "Address", "Order",
];
/// Includes a blank text and an invalid expression
const SEARCH_TEXTS: &[&str] = &["Patient", "term", "Trial.*", "^Order", "E1", "[", "  "];
const LOCAL_COLLECTION: &str = "sim-local";
const REMOTE_COLLECTION: &str = "sim-remote";
const MAX_DEPTH: u32 = 3;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Operations to run
    pub operations: u64,
    /// Entities in the generated repository
    pub entities: usize,
    /// Relationships in the generated repository
    pub relationships: usize,
    /// Latency added to every gateway call
    pub latency_ms: u64,
    /// Stop conditions
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            operations: 1000,
            entities: 40,
            relationships: 80,
            latency_ms: 0,
            stop_on_first_violation: true,
        }
    }
}

/// Simulated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    /// Retrieve an instance (guid may be blank or unknown)
    GetInstance {
        /// Requested guid
        guid: String,
        /// Requested category
        category: InstanceCategory,
    },
    /// Count a prospective traversal
    PreTraversal {
        /// Root entity
        guid: String,
        /// Depth, possibly out of range
        depth: u32,
    },
    /// Traverse, optionally filtered to one entity type from the pre-traversal
    Traversal {
        /// Root entity
        guid: String,
        /// Depth, possibly out of range
        depth: u32,
        /// Filter by the first reported entity type
        filtered: bool,
    },
    /// Search; results are kept for a later commit
    Search {
        /// Searched category
        category: InstanceCategory,
        /// Search text
        text: String,
    },
    /// Commit the first `picks` candidates of the last search
    CommitSearch {
        /// Number of candidates selected
        picks: usize,
    },
    /// First undo phase
    BeginUndo,
    /// Second undo phase
    CommitUndo,
    /// Both undo phases
    Undo,
    /// Clear the exploration
    Clear,
    /// Connect to the other server
    SwitchServer {
        /// Enterprise scope of the new context
        enterprise: bool,
    },
    /// Make the next call of an operation fail, then make that call
    InjectFailure(GatewayOperation),
    /// Clear while a retrieval is in flight
    ClearMidFlight {
        /// Requested guid
        guid: String,
    },
}

/// A violation detected during simulation
#[derive(Debug, Clone)]
pub enum Violation {
    /// `check_invariants` failed
    InvariantBroken {
        /// Step number
        step: u64,
        /// Operation just run
        operation: SimulatedOperation,
        /// Reported violation
        detail: String,
    },
    /// A failed or rejected operation changed the state
    StateChangedOnError {
        /// Step number
        step: u64,
        /// Operation
        operation: SimulatedOperation,
        /// Returned error
        error: String,
    },
    /// An operation that never commits changed the state
    ReadOnlyOperationMutated {
        /// Step number
        step: u64,
        /// Operation
        operation: SimulatedOperation,
    },
    /// Retrieving a known instance committed a generation
    KnownRetrievalCommitted {
        /// Step number
        step: u64,
        /// Retrieved guid
        guid: String,
    },
    /// Retrieval succeeded but the focus did not move to the instance
    FocusNotUpdated {
        /// Step number
        step: u64,
        /// Retrieved guid
        guid: String,
    },
    /// Commit did not take the next index
    GenerationMisnumbered {
        /// Step number
        step: u64,
        /// Operation
        operation: SimulatedOperation,
        /// Expected index
        expected: u32,
        /// Committed index
        actual: u32,
    },
    /// Committed generation holds a guid that was already known
    KnownGuidRecommitted {
        /// Step number
        step: u64,
        /// Operation
        operation: SimulatedOperation,
        /// Guid
        guid: Guid,
    },
    /// "Unchanged" outcome but the index changed
    IndexChangedWithoutCommit {
        /// Step number
        step: u64,
        /// Operation
        operation: SimulatedOperation,
    },
    /// Undo did not remove exactly the top generation
    UndoMismatch {
        /// Step number
        step: u64,
        /// Top before the undo
        top_before: u32,
        /// Top after the undo
        top_after: u32,
    },
    /// State not empty after clear or server switch
    StateNotReset {
        /// Step number
        step: u64,
        /// Operation
        operation: SimulatedOperation,
    },
    /// Selection from a superseded search was committed
    StaleSelectionCommitted {
        /// Step number
        step: u64,
    },
    /// Injected gateway failure was not reported as an error
    InjectedFailureSwallowed {
        /// Step number
        step: u64,
        /// Failed gateway operation
        operation: GatewayOperation,
    },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    /// Operations run
    pub operations_run: u64,
    /// Generations committed
    pub generations_committed: u64,
    /// Operations that found nothing new
    pub unchanged: u64,
    /// Responses discarded as stale
    pub discarded: u64,
    /// Operations rejected before the gateway
    pub validation_rejections: u64,
    /// Operations failed by the gateway
    pub gateway_failures: u64,
    /// Generations removed by undo
    pub generations_removed: u64,
    /// Clears, including clears with a retrieval in flight
    pub clears: u64,
    /// Server switches
    pub server_switches: u64,
    /// Most instances known at once
    pub peak_known: usize,
    /// Highest generation index reached
    pub peak_generation: u32,
}

/// Final report from simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Violations found
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let stats = &self.stats;

        report.push_str("=== REX Simulator Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(
            report,
            "Repository: {} entities, {} relationships",
            self.config.entities, self.config.relationships
        );
        let _ = writeln!(report, "Operations Run: {}", stats.operations_run);
        let _ = writeln!(report, "Generations Committed: {}", stats.generations_committed);
        let _ = writeln!(report, "Generations Removed: {}", stats.generations_removed);
        let _ = writeln!(report, "Unchanged: {}", stats.unchanged);
        let _ = writeln!(report, "Discarded (stale): {}", stats.discarded);
        let _ = writeln!(report, "Validation Rejections: {}", stats.validation_rejections);
        let _ = writeln!(report, "Gateway Failures: {}", stats.gateway_failures);
        let _ = writeln!(report, "Clears: {}", stats.clears);
        let _ = writeln!(report, "Server Switches: {}", stats.server_switches);
        let _ = writeln!(report, "Peak Known Instances: {}", stats.peak_known);
        let _ = writeln!(report, "Peak Generation: {}", stats.peak_generation);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {v:?}", i + 1);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Generate a random repository
///
/// About one entity in seven is homed in a remote collection, so it is only
/// visible to enterprise-scoped contexts.
///
/// # Errors
/// Returns [`TypeError`] if a generated guid is rejected.
pub fn generate_fixture(
    rng: &mut StdRng,
    entities: usize,
    relationships: usize,
) -> Result<RepositoryFixture, TypeError> {
    let type_ref = |name: &str| TypeRef::new(name, format!("type-{}", name.to_lowercase()));
    let relationships = if entities == 0 { 0 } else { relationships };

    let entities = (0..entities)
        .map(|i| {
            let type_name = ENTITY_TYPES[rng.random_range(0..ENTITY_TYPES.len())];
            let label = format!("{} {i}", WORDS[rng.random_range(0..WORDS.len())]);
            let mut properties = Map::new();
            properties.insert(
                "qualifiedName".into(),
                json!(format!("{}:{}", type_name, label.to_lowercase())),
            );
            Ok(StoredEntity {
                guid: Guid::new(format!("E{i}"))?,
                type_name: type_name.to_string(),
                label,
                home_repository_id: rng
                    .random_bool(1.0 / 7.0)
                    .then(|| REMOTE_COLLECTION.to_string()),
                classifications: CLASSIFICATIONS
                    .iter()
                    .filter(|_| rng.random_bool(0.25))
                    .map(|c| (*c).to_string())
                    .collect(),
                properties,
            })
        })
        .collect::<Result<Vec<_>, TypeError>>()?;

    let relationships = (0..relationships)
        .map(|i| {
            let type_name = RELATIONSHIP_TYPES[rng.random_range(0..RELATIONSHIP_TYPES.len())];
            Ok(StoredRelationship {
                guid: Guid::new(format!("R{i}"))?,
                type_name: type_name.to_string(),
                label: rng.random_bool(0.5).then(|| format!("{type_name} {i}")),
                home_repository_id: None,
                end1: entities[rng.random_range(0..entities.len())].guid.clone(),
                end2: entities[rng.random_range(0..entities.len())].guid.clone(),
                properties: Map::new(),
            })
        })
        .collect::<Result<Vec<_>, TypeError>>()?;

    Ok(RepositoryFixture {
        local_repository_id: Some(LOCAL_COLLECTION.to_string()),
        entity_types: ENTITY_TYPES.iter().map(|t| type_ref(t)).collect(),
        relationship_types: RELATIONSHIP_TYPES.iter().map(|t| type_ref(t)).collect(),
        classifications: CLASSIFICATIONS.iter().map(|c| (*c).to_string()).collect(),
        entities,
        relationships,
    })
}

/// Run the REX Simulator
///
/// # Errors
/// Fails if the generated repository cannot be loaded or the engine refuses
/// the initial server context.
pub async fn run_simulator(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let fixture = generate_fixture(&mut rng, config.entities, config.relationships)?;
    let mut repository = MemoryRepository::from_fixture(fixture)?;
    if config.latency_ms > 0 {
        repository = repository.with_latency(Duration::from_millis(config.latency_ms));
    }
    let mut simulation = Simulation::new(Arc::new(repository))?;
    tracing::info!(seed = config.seed, operations = config.operations, "simulation started");

    for step in 0..config.operations {
        let operation = simulation.generate_operation(&mut rng);
        let before = simulation.violations.len();
        simulation.execute(step, operation).await;
        if config.stop_on_first_violation && simulation.violations.len() > before {
            tracing::warn!(step, "stopping at first violation");
            break;
        }
    }

    Ok(SimulatorReport {
        config,
        stats: simulation.stats,
        violations: simulation.violations,
    })
}

struct Simulation {
    engine: ExplorationEngine,
    repository: Arc<MemoryRepository>,
    entity_guids: Vec<String>,
    relationship_guids: Vec<String>,
    servers: [ServerContext; 2],
    active_server: usize,
    pending_search: Option<SearchResults>,
    /// Cleared or switched since `pending_search` was returned
    search_superseded: bool,
    missing: u64,
    stats: SimulatorStats,
    violations: Vec<Violation>,
}

impl Simulation {
    fn new(repository: Arc<MemoryRepository>) -> anyhow::Result<Self> {
        let config = ExplorerConfig::new().with_max_depth(MAX_DEPTH);
        let servers = [
            config.server("simMDS1", "https://sim-1:9443"),
            config.server("simMDS2", "https://sim-2:9443"),
        ];
        let engine = ExplorationEngine::new(
            repository.clone(),
            Arc::new(repository.catalog().clone()),
            config,
        );
        engine.connect(servers[0].clone())?;
        Ok(Self {
            engine,
            entity_guids: repository.entity_guids().map(ToString::to_string).collect(),
            relationship_guids: repository
                .relationship_guids()
                .map(ToString::to_string)
                .collect(),
            repository,
            servers,
            active_server: 0,
            pending_search: None,
            search_superseded: false,
            missing: 0,
            stats: SimulatorStats::default(),
            violations: Vec::new(),
        })
    }

    /// Existing guid most of the time, otherwise unknown or blank
    fn pick_guid(&mut self, rng: &mut StdRng, category: InstanceCategory) -> String {
        let roll = rng.random_range(0..100);
        if roll < 85 {
            let pool = match category {
                InstanceCategory::Entity => &self.entity_guids,
                InstanceCategory::Relationship => &self.relationship_guids,
            };
            return pool.choose(rng).cloned().unwrap_or_else(|| "  ".to_string());
        }
        match roll {
            85..=92 => {
                self.missing += 1;
                format!("missing-{}", self.missing)
            }
            _ => "  ".to_string(),
        }
    }

    /// Focused entity most of the time
    fn pick_root(&mut self, rng: &mut StdRng) -> String {
        match self.engine.focus() {
            Some(focus) if focus.is_entity() && rng.random_bool(0.7) => focus.guid.to_string(),
            _ => self.pick_guid(rng, InstanceCategory::Entity),
        }
    }

    fn generate_operation(&mut self, rng: &mut StdRng) -> SimulatedOperation {
        let category = if rng.random_bool(0.8) {
            InstanceCategory::Entity
        } else {
            InstanceCategory::Relationship
        };
        match rng.random_range(0..100) {
            0..=24 => SimulatedOperation::GetInstance {
                guid: self.pick_guid(rng, category),
                category,
            },
            25..=31 => SimulatedOperation::PreTraversal {
                guid: self.pick_root(rng),
                depth: rng.random_range(0..=MAX_DEPTH + 1),
            },
            32..=46 => SimulatedOperation::Traversal {
                guid: self.pick_root(rng),
                depth: rng.random_range(0..=MAX_DEPTH + 1),
                filtered: rng.random_bool(0.3),
            },
            47..=54 => SimulatedOperation::Search {
                category,
                text: SEARCH_TEXTS[rng.random_range(0..SEARCH_TEXTS.len())].to_string(),
            },
            55..=61 => SimulatedOperation::CommitSearch {
                picks: rng.random_range(0..4),
            },
            62..=65 => SimulatedOperation::BeginUndo,
            66..=69 => SimulatedOperation::CommitUndo,
            70..=77 => SimulatedOperation::Undo,
            78..=80 => SimulatedOperation::Clear,
            81..=83 => SimulatedOperation::SwitchServer {
                enterprise: rng.random_bool(0.5),
            },
            84..=91 => {
                let focus_is_entity = self.engine.focus().is_some_and(|f| f.is_entity());
                let mut choices = vec![GatewayOperation::SearchEntities];
                if !self.entity_guids.is_empty() {
                    choices.push(GatewayOperation::FetchEntity);
                }
                if focus_is_entity {
                    choices.extend([GatewayOperation::PreTraversal, GatewayOperation::Traversal]);
                }
                SimulatedOperation::InjectFailure(choices[rng.random_range(0..choices.len())])
            }
            _ => SimulatedOperation::ClearMidFlight {
                guid: self.pick_guid(rng, InstanceCategory::Entity),
            },
        }
    }

    async fn execute(&mut self, step: u64, operation: SimulatedOperation) {
        let before = self.engine.snapshot();
        self.stats.operations_run += 1;
        tracing::debug!(step, ?operation, "simulated operation");

        match &operation {
            SimulatedOperation::GetInstance { guid, category } => {
                let result = self.engine.get_instance(guid, *category).await;
                if matches!(result, Ok(MergeOutcome::Extended(_) | MergeOutcome::Unchanged))
                    && self.engine.focus_guid().map(|g| g.to_string()).as_deref() != Some(guid.as_str())
                {
                    self.violations.push(Violation::FocusNotUpdated {
                        step,
                        guid: guid.clone(),
                    });
                }
                let known = Guid::new(guid.as_str()).is_ok_and(|g| before.contains(&g));
                if known && matches!(result, Ok(MergeOutcome::Extended(_))) {
                    self.violations.push(Violation::KnownRetrievalCommitted {
                        step,
                        guid: guid.clone(),
                    });
                }
                self.check_merge(step, &operation, &before, result, true);
            }
            SimulatedOperation::PreTraversal { guid, depth } => {
                let result = self.engine.pre_traversal(guid, *depth).await;
                self.count_error(result.as_ref().err());
                self.check_untouched(step, &operation, &before);
            }
            SimulatedOperation::Traversal {
                guid,
                depth,
                filtered,
            } => {
                let result = self.traverse(guid, *depth, *filtered).await;
                self.check_merge(step, &operation, &before, result, true);
            }
            SimulatedOperation::Search { category, text } => {
                match self.engine.search(*category, text, None).await {
                    Ok(Some(results)) => {
                        self.pending_search = Some(results);
                        self.search_superseded = false;
                    }
                    Ok(None) => self.stats.discarded += 1,
                    Err(error) => self.count_error(Some(&error)),
                }
                self.check_untouched(step, &operation, &before);
            }
            SimulatedOperation::CommitSearch { picks } => {
                if let Some(results) = self.pending_search.take() {
                    let picked: Vec<Guid> = results
                        .candidates
                        .iter()
                        .take(*picks)
                        .map(|d| d.guid.clone())
                        .collect();
                    let outcome = self.engine.commit_search_selection(results.select(&picked)).await;
                    if self.search_superseded && outcome != MergeOutcome::Discarded {
                        self.violations.push(Violation::StaleSelectionCommitted { step });
                    }
                    self.check_merge(step, &operation, &before, Ok(outcome), false);
                }
            }
            SimulatedOperation::BeginUndo => {
                let _ = self.engine.begin_undo();
                self.check_untouched(step, &operation, &before);
            }
            SimulatedOperation::CommitUndo => {
                let removed = self.engine.commit_undo();
                self.check_undo(step, &before, removed.ok().flatten());
            }
            SimulatedOperation::Undo => {
                let removed = self.engine.undo();
                self.check_undo(step, &before, removed.ok().flatten());
            }
            SimulatedOperation::Clear => {
                self.engine.clear();
                self.stats.clears += 1;
                self.search_superseded = true;
                self.check_reset(step, &operation);
            }
            SimulatedOperation::SwitchServer { enterprise } => {
                self.active_server = 1 - self.active_server;
                let server = self.servers[self.active_server]
                    .clone()
                    .with_enterprise(*enterprise);
                if let Err(error) = self.engine.connect(server) {
                    self.count_error(Some(&ExploreError::from(error)));
                }
                self.stats.server_switches += 1;
                self.search_superseded = true;
                self.check_reset(step, &operation);
            }
            SimulatedOperation::InjectFailure(failed) => {
                self.inject_failure(step, &operation, *failed, &before).await;
            }
            SimulatedOperation::ClearMidFlight { guid } => {
                let engine = &self.engine;
                let (result, ()) = tokio::join!(
                    engine.get_instance(guid, InstanceCategory::Entity),
                    async {
                        tokio::task::yield_now().await;
                        engine.clear();
                    }
                );
                match result {
                    Ok(MergeOutcome::Discarded) => self.stats.discarded += 1,
                    Ok(_) => {}
                    Err(error) => self.count_error(Some(&error)),
                }
                self.stats.clears += 1;
                self.search_superseded = true;
                self.check_reset(step, &operation);
            }
        }

        let after = self.engine.snapshot();
        if let Err(violation) = after.check_invariants() {
            self.violations.push(Violation::InvariantBroken {
                step,
                operation,
                detail: violation.to_string(),
            });
        }
        self.stats.peak_known = self.stats.peak_known.max(after.known_count());
        self.stats.peak_generation = self
            .stats
            .peak_generation
            .max(after.current_generation().get());
    }

    async fn traverse(
        &self,
        guid: &str,
        depth: u32,
        filtered: bool,
    ) -> Result<MergeOutcome, ExploreError> {
        let mut filter = TraversalFilter::unfiltered();
        if filtered {
            if let Some(stats) = self.engine.pre_traversal(guid, depth).await? {
                let chosen: Vec<String> = stats.per_entity_type.keys().take(1).cloned().collect();
                filter = self
                    .engine
                    .traversal_filter(&stats, &chosen, &[], &[])?;
            }
        }
        self.engine.traversal(guid, depth, filter).await
    }

    async fn inject_failure(
        &mut self,
        step: u64,
        operation: &SimulatedOperation,
        failed: GatewayOperation,
        before: &ExplorationState,
    ) {
        self.repository
            .fail_next(failed, GatewayError::Transport("injected fault".into()));
        let entity = self.entity_guids.first().cloned().unwrap_or_default();
        let root = self
            .engine
            .focus_guid()
            .map_or_else(|| entity.clone(), |g| g.to_string());

        let error = match failed {
            GatewayOperation::PreTraversal => self.engine.pre_traversal(&root, 1).await.err(),
            GatewayOperation::Traversal => self
                .engine
                .traversal(&root, 1, TraversalFilter::unfiltered())
                .await
                .err(),
            GatewayOperation::SearchEntities => self
                .engine
                .search(InstanceCategory::Entity, "Patient", None)
                .await
                .err(),
            _ => self
                .engine
                .get_instance(&entity, InstanceCategory::Entity)
                .await
                .err(),
        };
        match error {
            Some(ExploreError::Gateway(_)) => {
                self.stats.gateway_failures += 1;
                if self.engine.snapshot() != *before {
                    self.violations.push(Violation::StateChangedOnError {
                        step,
                        operation: operation.clone(),
                        error: "injected fault".into(),
                    });
                }
            }
            _ => self.violations.push(Violation::InjectedFailureSwallowed {
                step,
                operation: failed,
            }),
        }
    }

    fn count_error(&mut self, error: Option<&ExploreError>) {
        match error {
            Some(error) if error.is_validation() => self.stats.validation_rejections += 1,
            Some(_) => self.stats.gateway_failures += 1,
            None => {}
        }
    }

    fn check_untouched(
        &mut self,
        step: u64,
        operation: &SimulatedOperation,
        before: &ExplorationState,
    ) {
        if self.engine.snapshot() != *before {
            self.violations.push(Violation::ReadOnlyOperationMutated {
                step,
                operation: operation.clone(),
            });
        }
    }

    /// Check a committing operation; `strict_unchanged` requires an
    /// untouched index when nothing was committed
    fn check_merge(
        &mut self,
        step: u64,
        operation: &SimulatedOperation,
        before: &ExplorationState,
        result: Result<MergeOutcome, ExploreError>,
        strict_unchanged: bool,
    ) {
        let after = self.engine.snapshot();
        match result {
            Ok(MergeOutcome::Extended(index)) => {
                self.stats.generations_committed += 1;
                let expected = before.current_generation().next();
                if index != expected {
                    self.violations.push(Violation::GenerationMisnumbered {
                        step,
                        operation: operation.clone(),
                        expected: expected.get(),
                        actual: index.get(),
                    });
                }
                let recommitted = after
                    .generation(index)
                    .and_then(|g| g.guids().find(|guid| before.contains(guid)).cloned());
                if let Some(guid) = recommitted {
                    self.violations.push(Violation::KnownGuidRecommitted {
                        step,
                        operation: operation.clone(),
                        guid,
                    });
                }
            }
            Ok(MergeOutcome::Unchanged) => {
                self.stats.unchanged += 1;
                if strict_unchanged && after.guid_index() != before.guid_index() {
                    self.violations.push(Violation::IndexChangedWithoutCommit {
                        step,
                        operation: operation.clone(),
                    });
                }
            }
            Ok(MergeOutcome::Discarded) => self.stats.discarded += 1,
            Err(error) => {
                self.count_error(Some(&error));
                if after != *before {
                    self.violations.push(Violation::StateChangedOnError {
                        step,
                        operation: operation.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }
    }

    fn check_undo(
        &mut self,
        step: u64,
        before: &ExplorationState,
        removed: Option<GenerationIndex>,
    ) {
        let after = self.engine.snapshot();
        let top_before = before.current_generation();
        let expected_after = if before.is_empty() {
            top_before
        } else {
            top_before.prev()
        };
        let leftover = before
            .top()
            .is_some_and(|g| g.guids().any(|guid| after.contains(guid)));
        let removed_ok = removed == before.top().map(|g| g.index);

        if after.current_generation() != expected_after || leftover || !removed_ok {
            self.violations.push(Violation::UndoMismatch {
                step,
                top_before: top_before.get(),
                top_after: after.current_generation().get(),
            });
        }
        if removed.is_some() {
            self.stats.generations_removed += 1;
        }
    }

    fn check_reset(&mut self, step: u64, operation: &SimulatedOperation) {
        let after = self.engine.snapshot();
        if !after.is_empty() || after.focus().is_some() {
            self.violations.push(Violation::StateNotReset {
                step,
                operation: operation.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn default_run_passes() {
        let report = run_simulator(SimulatorConfig {
            operations: 500,
            ..SimulatorConfig::default()
        })
        .await
        .unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.operations_run, 500);
        assert!(report.stats.generations_committed > 0);
        assert!(report.stats.validation_rejections > 0);
        assert!(report.stats.gateway_failures > 0);
        assert!(report.generate_text().contains("=== Result: PASS ==="));
    }

    #[tokio::test]
    async fn latency_exercises_stale_discard() {
        let report = run_simulator(SimulatorConfig {
            seed: 7,
            operations: 300,
            latency_ms: 1,
            ..SimulatorConfig::default()
        })
        .await
        .unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert!(report.stats.clears > 0);
    }

    #[tokio::test]
    async fn runs_are_reproducible() {
        let config = SimulatorConfig {
            seed: 1234,
            operations: 200,
            ..SimulatorConfig::default()
        };
        let first = run_simulator(config.clone()).await.unwrap();
        let second = run_simulator(config).await.unwrap();

        assert_eq!(first.generate_text(), second.generate_text());
    }

    #[test]
    fn generated_fixture_loads() {
        let mut rng = StdRng::seed_from_u64(3);
        let fixture = generate_fixture(&mut rng, 25, 60).unwrap();

        assert_eq!(fixture.entities.len(), 25);
        assert_eq!(fixture.relationships.len(), 60);
        let repository = MemoryRepository::from_fixture(fixture).unwrap();
        assert_eq!(repository.entity_count(), 25);
        assert_eq!(repository.local_repository_id(), LOCAL_COLLECTION);
    }

    #[test]
    fn empty_repository_has_no_relationships() {
        let mut rng = StdRng::seed_from_u64(3);
        let fixture = generate_fixture(&mut rng, 0, 10).unwrap();
        assert!(fixture.relationships.is_empty());
    }

    #[tokio::test]
    async fn empty_repository_still_runs() {
        let report = run_simulator(SimulatorConfig {
            operations: 100,
            entities: 0,
            relationships: 0,
            ..SimulatorConfig::default()
        })
        .await
        .unwrap();
        assert!(report.passed(), "{}", report.generate_text());
    }

    #[test]
    fn report_lists_violations() {
        let report = SimulatorReport {
            config: SimulatorConfig::default(),
            stats: SimulatorStats::default(),
            violations: vec![Violation::StaleSelectionCommitted { step: 4 }],
        };
        let text = report.generate_text();
        assert!(!report.passed());
        assert!(text.contains("=== Violations ==="));
        assert!(text.contains("1. StaleSelectionCommitted { step: 4 }"));
        assert!(text.contains("=== Result: FAIL ==="));
    }
}
