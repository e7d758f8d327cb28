//! Candidate sets and the filter-then-commit merge
//!
//! Gateway results and search selections become a [`CandidateSet`]. Before a
//! commit, every candidate whose guid is already indexed is dropped; only
//! survivors form the new generation. An empty survivor set commits nothing.

use indexmap::IndexMap;
use rex_gateway::TraversalResponse;
use rex_types::{GenerationIndex, Guid, InstanceCategory, InstanceDigest};
use std::collections::BTreeMap;

/// Result of applying a response or selection to the exploration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new generation was committed
    Extended(GenerationIndex),
    /// Nothing new (known instance refreshed, or no new objects)
    Unchanged,
    /// Response belonged to a superseded session and was ignored
    Discarded,
}

impl MergeOutcome {
    /// Generation committed, if any
    #[inline]
    #[must_use]
    pub fn generation(self) -> Option<GenerationIndex> {
        match self {
            Self::Extended(index) => Some(index),
            Self::Unchanged | Self::Discarded => None,
        }
    }
}

/// Digests proposed for a new generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    entities: IndexMap<Guid, InstanceDigest>,
    relationships: IndexMap<Guid, InstanceDigest>,
}

impl CandidateSet {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates from a selection of one category
    #[must_use]
    pub fn from_selection(
        category: InstanceCategory,
        digests: impl IntoIterator<Item = InstanceDigest>,
    ) -> Self {
        let mut set = Self::new();
        for digest in digests {
            set.push(category, digest);
        }
        set
    }

    /// Add a digest; a guid already proposed (in either category) is ignored
    pub fn push(&mut self, category: InstanceCategory, digest: InstanceDigest) {
        if self.contains(&digest.guid) {
            return;
        }
        let target = match category {
            InstanceCategory::Entity => &mut self.entities,
            InstanceCategory::Relationship => &mut self.relationships,
        };
        target.insert(digest.guid.clone(), digest);
    }

    /// Whether `guid` is proposed
    #[must_use]
    pub fn contains(&self, guid: &Guid) -> bool {
        self.entities.contains_key(guid) || self.relationships.contains_key(guid)
    }

    /// Drop every candidate already present in `index`; returns how many were dropped
    pub fn retain_unknown(&mut self, index: &BTreeMap<Guid, GenerationIndex>) -> usize {
        let before = self.len();
        self.entities.retain(|guid, _| !index.contains_key(guid));
        self.relationships.retain(|guid, _| !index.contains_key(guid));
        before - self.len()
    }

    /// Total candidates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() + self.relationships.len()
    }

    /// Whether no candidates remain
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Split into entity and relationship maps
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        IndexMap<Guid, InstanceDigest>,
        IndexMap<Guid, InstanceDigest>,
    ) {
        (self.entities, self.relationships)
    }
}

impl From<TraversalResponse> for CandidateSet {
    fn from(response: TraversalResponse) -> Self {
        let mut set = Self::new();
        for digest in response.entities.into_values() {
            set.push(InstanceCategory::Entity, digest);
        }
        for digest in response.relationships.into_values() {
            set.push(InstanceCategory::Relationship, digest);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(guid: &str) -> InstanceDigest {
        InstanceDigest::new(Guid::new(guid).unwrap(), guid, "Asset", "repo")
    }

    #[test]
    fn retain_unknown_drops_indexed() {
        let mut set = CandidateSet::from_selection(
            InstanceCategory::Entity,
            vec![digest("E1"), digest("E2")],
        );
        set.push(InstanceCategory::Relationship, digest("R1"));

        let mut index = BTreeMap::new();
        index.insert(Guid::new("E1").unwrap(), GenerationIndex::FIRST);

        assert_eq!(set.retain_unknown(&index), 1);
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&Guid::new("E1").unwrap()));
    }

    #[test]
    fn duplicate_guid_across_categories_ignored() {
        let mut set = CandidateSet::new();
        set.push(InstanceCategory::Entity, digest("X"));
        set.push(InstanceCategory::Relationship, digest("X"));
        let (entities, relationships) = set.into_parts();
        assert_eq!(entities.len(), 1);
        assert!(relationships.is_empty());
    }

    #[test]
    fn outcome_generation() {
        assert_eq!(
            MergeOutcome::Extended(GenerationIndex::FIRST).generation(),
            Some(GenerationIndex::FIRST)
        );
        assert_eq!(MergeOutcome::Discarded.generation(), None);
    }
}
