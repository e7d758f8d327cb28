//! History projection
//!
//! A read-only view of the generation stack for history renderers. Root
//! references (the origin entity of a traversal, the guid of a retrieval)
//! are resolved through the guid index, so a generation whose root was
//! introduced earlier still renders with that root's label.

use crate::state::{ExplorationState, Generation, OperationParams};
use rex_types::{GenerationIndex, Guid, InstanceCategory, OperationKind, TypeRef};
use serde::{Deserialize, Serialize};

/// One instance introduced by a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Entity or relationship
    pub category: InstanceCategory,
    /// Display label
    pub label: String,
    /// Instance guid
    pub guid: Guid,
}

/// Summary of one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Generation index
    pub index: GenerationIndex,
    /// Operation that produced it
    pub operation: OperationKind,
    /// Server it was discovered on
    pub server_name: String,
    /// Human-readable description
    pub description: String,
    /// Instances introduced, entities first
    pub instances: Vec<HistoryItem>,
}

/// Project every generation of `state`, oldest first
#[must_use]
pub fn project(state: &ExplorationState) -> Vec<HistoryEntry> {
    state
        .generations()
        .iter()
        .map(|generation| HistoryEntry {
            index: generation.index,
            operation: generation.operation,
            server_name: generation.server_name.clone(),
            description: describe(state, generation),
            instances: items(generation),
        })
        .collect()
}

fn items(generation: &Generation) -> Vec<HistoryItem> {
    let entities = generation
        .entities
        .values()
        .map(|d| (InstanceCategory::Entity, d));
    let relationships = generation
        .relationships
        .values()
        .map(|d| (InstanceCategory::Relationship, d));
    entities
        .chain(relationships)
        .map(|(category, digest)| HistoryItem {
            category,
            label: digest.label.clone(),
            guid: digest.guid.clone(),
        })
        .collect()
}

fn describe(state: &ExplorationState, generation: &Generation) -> String {
    let server = &generation.server_name;
    match &generation.params {
        OperationParams::Retrieval { guid } => {
            let category = match generation.operation {
                OperationKind::GetRelationship => InstanceCategory::Relationship,
                _ => InstanceCategory::Entity,
            };
            format!("{server}: retrieved {category} {}", label_of(state, guid))
        }
        OperationParams::Traversal {
            root,
            depth,
            filter,
        } => format!(
            "{server}: traversal from entity {}, depth {depth}, entity filters: [{}], \
             relationship filters: [{}], classification filters: [{}]",
            label_of(state, root),
            type_names(&filter.entity_types),
            type_names(&filter.relationship_types),
            filter.classifications.join(", "),
        ),
        OperationParams::Search {
            search_text,
            type_filter,
        } => {
            let category = match generation.operation {
                OperationKind::RelationshipSearch => InstanceCategory::Relationship,
                _ => InstanceCategory::Entity,
            };
            let mut description = format!("{server}: {category} search for \"{search_text}\"");
            if let Some(type_filter) = type_filter {
                description.push_str(&format!(", type filter: {}", type_filter.name));
            }
            description
        }
    }
}

fn label_of(state: &ExplorationState, guid: &Guid) -> String {
    state
        .digest(guid)
        .map_or_else(|| guid.to_string(), |(_, digest)| digest.label.clone())
}

fn type_names(types: &[TypeRef]) -> String {
    types
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
