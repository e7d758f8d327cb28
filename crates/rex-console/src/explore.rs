//! One-shot exploration session against a fixture repository
//!
//! Retrieves a starting entity, asks for pre-traversal counts, traverses
//! with the requested filters and optionally commits a search. The history
//! is what gets printed.

use rex_engine::{
    ChannelObserver, ExplorationEngine, ExploreError, ExplorerConfig, HistoryEntry, MergeOutcome,
};
use rex_gateway::MemoryRepository;
use rex_types::{InstanceCategory, PreTraversalStats, ServerContext, TraversalFilter};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Fixture bundled with the binary
pub const BUNDLED_FIXTURE: &str = include_str!("../fixtures/coco.json");

/// What to explore
#[derive(Debug, Clone)]
pub struct ExploreOptions {
    /// Server to connect to
    pub server: ServerContext,
    /// Starting entity guid
    pub entity: String,
    /// Traversal depth, defaults to the configured default
    pub depth: Option<u32>,
    /// Entity type names to keep
    pub entity_types: Vec<String>,
    /// Relationship type names to keep
    pub relationship_types: Vec<String>,
    /// Classification names to keep
    pub classifications: Vec<String>,
    /// Entity search to commit after the traversal
    pub search: Option<String>,
}

/// Result of a session
#[derive(Debug, Clone, Serialize)]
pub struct ExploreReport {
    /// Pre-traversal counts of the starting entity
    pub stats: Option<PreTraversalStats>,
    /// Generation history
    pub history: Vec<HistoryEntry>,
    /// Notifications observed, in order
    pub events: Vec<&'static str>,
}

/// Run a session
///
/// # Errors
/// Returns the first [`ExploreError`] raised by the engine.
pub async fn run_exploration(
    repository: Arc<MemoryRepository>,
    config: ExplorerConfig,
    options: &ExploreOptions,
) -> Result<ExploreReport, ExploreError> {
    let depth = options.depth.unwrap_or(config.default_depth);
    let engine = ExplorationEngine::new(
        repository.clone(),
        Arc::new(repository.catalog().clone()),
        config,
    );
    let (observer, mut receiver) = ChannelObserver::channel();
    engine.subscribe(Arc::new(observer));

    engine.connect(options.server.clone())?;
    engine
        .get_instance(&options.entity, InstanceCategory::Entity)
        .await?;

    let stats = engine.pre_traversal(&options.entity, depth).await?;
    let filter = match &stats {
        Some(stats) => engine.traversal_filter(
            stats,
            &options.entity_types,
            &options.relationship_types,
            &options.classifications,
        )?,
        None => TraversalFilter::unfiltered(),
    };
    if engine.traversal(&options.entity, depth, filter).await? == MergeOutcome::Unchanged {
        tracing::info!(entity = %options.entity, "traversal found nothing new");
    }

    if let Some(text) = &options.search {
        if let Some(results) = engine
            .search(InstanceCategory::Entity, text, None)
            .await?
        {
            engine.commit_search_selection(results.select_all()).await;
        }
    }

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event.name());
    }
    Ok(ExploreReport {
        stats,
        history: engine.history(),
        events,
    })
}

/// Plain-text rendering of a history
#[must_use]
pub fn render_history(history: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in history {
        let _ = writeln!(out, "[{}] {}", entry.index, entry.description);
        for item in &entry.instances {
            let _ = writeln!(out, "    {:<12} {} ({})", item.category.as_str(), item.label, item.guid);
        }
    }
    out
}

/// Plain-text rendering of pre-traversal counts
#[must_use]
pub fn render_stats(stats: &PreTraversalStats) -> String {
    let mut out = format!("Pre-traversal of {} at depth {}\n", stats.entity_guid, stats.depth);
    for (name, count) in &stats.per_entity_type {
        let _ = writeln!(out, "    entity type        {name}: {}", count.count);
    }
    for (name, count) in &stats.per_relationship_type {
        let _ = writeln!(out, "    relationship type  {name}: {}", count.count);
    }
    for (name, count) in &stats.per_classification {
        let _ = writeln!(out, "    classification     {name}: {}", count.count);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(entity: &str) -> ExploreOptions {
        ExploreOptions {
            server: ServerContext::new("cocoMDS1", "https://localhost:9443"),
            entity: entity.to_string(),
            depth: Some(1),
            entity_types: Vec::new(),
            relationship_types: Vec::new(),
            classifications: Vec::new(),
            search: None,
        }
    }

    fn repository() -> Arc<MemoryRepository> {
        Arc::new(MemoryRepository::from_json_str(BUNDLED_FIXTURE).unwrap())
    }

    #[tokio::test]
    async fn explores_bundled_fixture() {
        let report = run_exploration(repository(), ExplorerConfig::default(), &options("term-patient"))
            .await
            .unwrap();

        assert_eq!(report.history.len(), 2);
        assert_eq!(
            report.history[0].description,
            "cocoMDS1: retrieved entity Patient"
        );
        assert!(report.stats.is_some());
        assert_eq!(report.events.first(), Some(&"graphExtended"));

        let text = render_history(&report.history);
        assert!(text.contains("[2] cocoMDS1: traversal from entity Patient, depth 1"));
        assert!(!text.contains("Treatment"));
    }

    #[tokio::test]
    async fn filters_and_search_apply() {
        let mut options = options("term-patient");
        options.entity_types = vec!["Asset".into()];
        options.search = Some("Clinical".into());

        let report = run_exploration(repository(), ExplorerConfig::default(), &options)
            .await
            .unwrap();

        let traversed = &report.history[1];
        assert!(traversed
            .instances
            .iter()
            .all(|item| item.label != "Patient Identifier"));
        assert!(traversed
            .instances
            .iter()
            .any(|item| item.label == "PATIENT table"));
        assert_eq!(
            report.history[2].description,
            "cocoMDS1: entity search for \"Clinical\""
        );
    }

    #[tokio::test]
    async fn unknown_filter_name_is_rejected() {
        let mut options = options("term-patient");
        options.entity_types = vec!["Process".into()];

        let err = run_exploration(repository(), ExplorerConfig::default(), &options)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
