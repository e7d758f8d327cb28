//! Instance digests, categories and focus

use crate::error::TypeError;
use crate::ids::{GenerationIndex, Guid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an instance is an entity or a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceCategory {
    /// Entity (graph node)
    Entity,
    /// Relationship (graph edge)
    Relationship,
}

impl InstanceCategory {
    /// Lower-case name used in descriptions
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Relationship => "relationship",
        }
    }
}

impl fmt::Display for InstanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceCategory {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entity" => Ok(Self::Entity),
            "relationship" => Ok(Self::Relationship),
            other => Err(TypeError::UnknownCategory(other.to_string())),
        }
    }
}

/// Kind of operation that produced a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Single entity retrieval
    GetEntity,
    /// Single relationship retrieval (plus its ends)
    GetRelationship,
    /// Entities selected from a search
    EntitySearch,
    /// Relationships selected from a search
    RelationshipSearch,
    /// Filtered expansion from an entity
    Traversal,
}

impl OperationKind {
    /// Retrieval kind for a category
    #[inline]
    #[must_use]
    pub fn retrieval(category: InstanceCategory) -> Self {
        match category {
            InstanceCategory::Entity => Self::GetEntity,
            InstanceCategory::Relationship => Self::GetRelationship,
        }
    }

    /// Search kind for a category
    #[inline]
    #[must_use]
    pub fn search(category: InstanceCategory) -> Self {
        match category {
            InstanceCategory::Entity => Self::EntitySearch,
            InstanceCategory::Relationship => Self::RelationshipSearch,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetEntity => "GetEntity",
            Self::GetRelationship => "GetRelationship",
            Self::EntitySearch => "EntitySearch",
            Self::RelationshipSearch => "RelationshipSearch",
            Self::Traversal => "Traversal",
        };
        f.write_str(name)
    }
}

/// The two entity ends of a relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipEnds {
    /// Guid of end 1
    pub end1: Guid,
    /// Guid of end 2
    pub end2: Guid,
}

impl RelationshipEnds {
    /// Create ends
    #[inline]
    #[must_use]
    pub fn new(end1: Guid, end2: Guid) -> Self {
        Self { end1, end2 }
    }

    /// Both end guids
    #[inline]
    #[must_use]
    pub fn guids(&self) -> [&Guid; 2] {
        [&self.end1, &self.end2]
    }
}

/// Lightweight summary of an entity or relationship
///
/// The generation is stamped by the engine when the digest is committed;
/// gateway results carry [`GenerationIndex::NONE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDigest {
    /// Instance guid
    pub guid: Guid,
    /// Display label
    pub label: String,
    /// Type name (e.g. `GlossaryTerm`)
    pub type_name: String,
    /// Metadata collection id of the home repository
    pub home_repository_id: String,
    /// Generation that introduced this instance
    #[serde(default)]
    pub generation: GenerationIndex,
    /// Relationship ends, `None` for entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends: Option<RelationshipEnds>,
}

impl InstanceDigest {
    /// Create an uncommitted digest
    #[must_use]
    pub fn new(
        guid: Guid,
        label: impl Into<String>,
        type_name: impl Into<String>,
        home_repository_id: impl Into<String>,
    ) -> Self {
        Self {
            guid,
            label: label.into(),
            type_name: type_name.into(),
            home_repository_id: home_repository_id.into(),
            generation: GenerationIndex::NONE,
            ends: None,
        }
    }

    /// With relationship ends
    #[inline]
    #[must_use]
    pub fn with_ends(mut self, ends: RelationshipEnds) -> Self {
        self.ends = Some(ends);
        self
    }

    /// With generation
    #[inline]
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationIndex) -> Self {
        self.generation = generation;
        self
    }

    /// Refresh ancillary fields from a newer observation of the same guid.
    ///
    /// Generation and ends are left untouched. Returns whether anything changed.
    pub fn refresh_from(&mut self, observed: &InstanceDigest) -> bool {
        let mut changed = false;
        if self.label != observed.label {
            self.label.clone_from(&observed.label);
            changed = true;
        }
        if self.home_repository_id != observed.home_repository_id {
            self.home_repository_id.clone_from(&observed.home_repository_id);
            changed = true;
        }
        changed
    }
}

/// The single instance currently selected for detail display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusInstance {
    /// Focused guid
    pub guid: Guid,
    /// Entity or relationship
    pub category: InstanceCategory,
    /// Full instance payload as returned by the gateway
    pub expanded_detail: serde_json::Value,
}

impl FocusInstance {
    /// Whether the focus is an entity
    #[inline]
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.category == InstanceCategory::Entity
    }
}
