//! Exploration state: generations, guid index and focus
//!
//! The state is a stack of generations plus an index from every known guid
//! to the generation that introduced it. All mutation goes through the
//! crate-private methods below, each of which preserves:
//!
//! 1. the current generation equals the number of generations
//! 2. every indexed guid lives in exactly the generation it is indexed to
//! 3. a guid is committed only if it is not already indexed
//! 4. the focus, if any, refers to an indexed guid
//! 5. only the top generation is ever removed
//!
//! [`ExplorationState::check_invariants`] verifies all five and is used by
//! tests and the simulator.

use crate::merge::CandidateSet;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rex_types::{
    FocusInstance, GenerationIndex, Guid, InstanceCategory, InstanceDigest, OperationKind,
    TraversalFilter, TypeRef,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of the operation that produced a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationParams {
    /// Single-instance retrieval
    Retrieval {
        /// Retrieved guid
        guid: Guid,
    },
    /// Search selection
    Search {
        /// Search expression
        search_text: String,
        /// Type restriction
        type_filter: Option<TypeRef>,
    },
    /// Traversal
    Traversal {
        /// Root entity
        root: Guid,
        /// Depth
        depth: u32,
        /// Filters used
        filter: TraversalFilter,
    },
}

/// One atomic batch of newly discovered instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// 1-based position in the stack
    pub index: GenerationIndex,
    /// Operation that produced it
    pub operation: OperationKind,
    /// Server it was discovered on
    pub server_name: String,
    /// Operation parameters (for history)
    pub params: OperationParams,
    /// Entities introduced
    pub entities: IndexMap<Guid, InstanceDigest>,
    /// Relationships introduced
    pub relationships: IndexMap<Guid, InstanceDigest>,
    /// Commit time
    pub discovered_at: DateTime<Utc>,
}

impl Generation {
    /// Number of instances introduced
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() + self.relationships.len()
    }

    /// Whether the generation introduced nothing (never true for committed generations)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every guid introduced, entities first
    pub fn guids(&self) -> impl Iterator<Item = &Guid> {
        self.entities.keys().chain(self.relationships.keys())
    }

    /// Look up a digest introduced by this generation
    #[must_use]
    pub fn digest(&self, guid: &Guid) -> Option<(InstanceCategory, &InstanceDigest)> {
        self.entities
            .get(guid)
            .map(|d| (InstanceCategory::Entity, d))
            .or_else(|| {
                self.relationships
                    .get(guid)
                    .map(|d| (InstanceCategory::Relationship, d))
            })
    }

    fn digest_mut(&mut self, guid: &Guid) -> Option<&mut InstanceDigest> {
        match self.entities.get_mut(guid) {
            Some(d) => Some(d),
            None => self.relationships.get_mut(guid),
        }
    }
}

/// Generation removed by an undo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoppedGeneration {
    /// The removed generation
    pub generation: Generation,
    /// Whether the focus pointed into it and was cleared
    pub focus_cleared: bool,
}

/// Broken invariant found by [`ExplorationState::check_invariants`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// Generation stored at the wrong position
    #[error("generation at position {position} carries index {index}")]
    MisplacedGeneration {
        /// 1-based position
        position: usize,
        /// Stored index
        index: GenerationIndex,
    },

    /// Indexed guid is missing from its generation
    #[error("{guid} indexed to generation {indexed} but not found there")]
    IndexMismatch {
        /// Guid
        guid: Guid,
        /// Indexed generation
        indexed: GenerationIndex,
    },

    /// Digest present in a generation but not indexed to it
    #[error("{guid} in generation {found} is not indexed to it")]
    UnindexedDigest {
        /// Guid
        guid: Guid,
        /// Generation holding it
        found: GenerationIndex,
    },

    /// Digest stamped with a different generation than the one holding it
    #[error("{guid} stamped {stamped} but held by generation {held}")]
    StampMismatch {
        /// Guid
        guid: Guid,
        /// Stamp on the digest
        stamped: GenerationIndex,
        /// Holding generation
        held: GenerationIndex,
    },

    /// Same guid held twice within the generations
    #[error("{digests} digests held but {indexed} guids indexed")]
    DuplicateDigests {
        /// Digests across all generations
        digests: usize,
        /// Index entries
        indexed: usize,
    },

    /// Committed generation with no instances
    #[error("generation {0} is empty")]
    EmptyGeneration(GenerationIndex),

    /// Focus refers to an unknown guid
    #[error("focus {0} is not indexed")]
    DanglingFocus(Guid),
}

/// Client-side exploration state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplorationState {
    generations: Vec<Generation>,
    guid_index: BTreeMap<Guid, GenerationIndex>,
    focus: Option<FocusInstance>,
}

impl ExplorationState {
    /// Empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the top generation ([`GenerationIndex::NONE`] when empty)
    #[inline]
    #[must_use]
    pub fn current_generation(&self) -> GenerationIndex {
        GenerationIndex::new(u32::try_from(self.generations.len()).unwrap_or(u32::MAX))
    }

    /// All generations, oldest first
    #[inline]
    #[must_use]
    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Generation by index
    #[must_use]
    pub fn generation(&self, index: GenerationIndex) -> Option<&Generation> {
        index.slot().and_then(|slot| self.generations.get(slot))
    }

    /// Top generation
    #[inline]
    #[must_use]
    pub fn top(&self) -> Option<&Generation> {
        self.generations.last()
    }

    /// Guid -> generation index
    #[inline]
    #[must_use]
    pub fn guid_index(&self) -> &BTreeMap<Guid, GenerationIndex> {
        &self.guid_index
    }

    /// Generation that introduced `guid`
    #[inline]
    #[must_use]
    pub fn generation_of(&self, guid: &Guid) -> Option<GenerationIndex> {
        self.guid_index.get(guid).copied()
    }

    /// Whether `guid` is known
    #[inline]
    #[must_use]
    pub fn contains(&self, guid: &Guid) -> bool {
        self.guid_index.contains_key(guid)
    }

    /// Number of known instances
    #[inline]
    #[must_use]
    pub fn known_count(&self) -> usize {
        self.guid_index.len()
    }

    /// Digest of a known instance, with its category
    #[must_use]
    pub fn digest(&self, guid: &Guid) -> Option<(InstanceCategory, &InstanceDigest)> {
        self.generation_of(guid)
            .and_then(|index| self.generation(index))
            .and_then(|generation| generation.digest(guid))
    }

    /// Current focus
    #[inline]
    #[must_use]
    pub fn focus(&self) -> Option<&FocusInstance> {
        self.focus.as_ref()
    }

    /// Whether nothing has been discovered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Commit the unknown subset of `candidates` as a new generation.
    ///
    /// Returns `None` (and changes nothing) when every candidate is already known.
    pub(crate) fn commit(
        &mut self,
        operation: OperationKind,
        server_name: &str,
        params: OperationParams,
        mut candidates: CandidateSet,
    ) -> Option<GenerationIndex> {
        candidates.retain_unknown(&self.guid_index);
        if candidates.is_empty() {
            return None;
        }

        let index = self.current_generation().next();
        let (mut entities, mut relationships) = candidates.into_parts();
        for digest in entities.values_mut().chain(relationships.values_mut()) {
            digest.generation = index;
            self.guid_index.insert(digest.guid.clone(), index);
        }

        self.generations.push(Generation {
            index,
            operation,
            server_name: server_name.to_string(),
            params,
            entities,
            relationships,
            discovered_at: Utc::now(),
        });
        Some(index)
    }

    /// Refresh label and home repository of a known instance; generation is kept
    pub(crate) fn refresh(&mut self, observed: &InstanceDigest) -> bool {
        let Some(slot) = self.generation_of(&observed.guid).and_then(GenerationIndex::slot) else {
            return false;
        };
        self.generations
            .get_mut(slot)
            .and_then(|generation| generation.digest_mut(&observed.guid))
            .is_some_and(|digest| digest.refresh_from(observed))
    }

    /// Set the focus; refused (returns false) if the guid is unknown
    pub(crate) fn set_focus(&mut self, focus: FocusInstance) -> bool {
        if !self.contains(&focus.guid) {
            return false;
        }
        self.focus = Some(focus);
        true
    }

    /// Remove the top generation and its index entries
    pub(crate) fn pop(&mut self) -> Option<PoppedGeneration> {
        let generation = self.generations.pop()?;
        for guid in generation.guids() {
            self.guid_index.remove(guid);
        }
        let focus_cleared = self
            .focus
            .as_ref()
            .is_some_and(|focus| generation.digest(&focus.guid).is_some());
        if focus_cleared {
            self.focus = None;
        }
        Some(PoppedGeneration {
            generation,
            focus_cleared,
        })
    }

    /// Reset to empty
    pub(crate) fn clear(&mut self) {
        self.generations.clear();
        self.guid_index.clear();
        self.focus = None;
    }

    /// Verify every structural invariant
    ///
    /// # Errors
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut digests = 0usize;
        for (position, generation) in self.generations.iter().enumerate() {
            let expected = GenerationIndex::new(u32::try_from(position + 1).unwrap_or(u32::MAX));
            if generation.index != expected {
                return Err(InvariantViolation::MisplacedGeneration {
                    position: position + 1,
                    index: generation.index,
                });
            }
            if generation.is_empty() {
                return Err(InvariantViolation::EmptyGeneration(generation.index));
            }
            for digest in generation.entities.values().chain(generation.relationships.values()) {
                digests += 1;
                if self.guid_index.get(&digest.guid) != Some(&generation.index) {
                    return Err(InvariantViolation::UnindexedDigest {
                        guid: digest.guid.clone(),
                        found: generation.index,
                    });
                }
                if digest.generation != generation.index {
                    return Err(InvariantViolation::StampMismatch {
                        guid: digest.guid.clone(),
                        stamped: digest.generation,
                        held: generation.index,
                    });
                }
            }
        }

        for (guid, indexed) in &self.guid_index {
            let held = self
                .generation(*indexed)
                .is_some_and(|generation| generation.digest(guid).is_some());
            if !held {
                return Err(InvariantViolation::IndexMismatch {
                    guid: guid.clone(),
                    indexed: *indexed,
                });
            }
        }

        if digests != self.guid_index.len() {
            return Err(InvariantViolation::DuplicateDigests {
                digests,
                indexed: self.guid_index.len(),
            });
        }

        if let Some(focus) = &self.focus {
            if !self.contains(&focus.guid) {
                return Err(InvariantViolation::DanglingFocus(focus.guid.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn guid(s: &str) -> Guid {
        Guid::new(s).unwrap()
    }

    fn digest(s: &str) -> InstanceDigest {
        InstanceDigest::new(guid(s), format!("label {s}"), "Asset", "repo")
    }

    fn retrieval(s: &str) -> OperationParams {
        OperationParams::Retrieval { guid: guid(s) }
    }

    fn entities(guids: &[&str]) -> CandidateSet {
        CandidateSet::from_selection(InstanceCategory::Entity, guids.iter().map(|g| digest(g)))
    }

    #[test]
    fn commit_stamps_and_indexes() {
        let mut state = ExplorationState::new();
        let index = state
            .commit(OperationKind::GetEntity, "srv", retrieval("E1"), entities(&["E1"]))
            .unwrap();

        assert_eq!(index, GenerationIndex::FIRST);
        assert_eq!(state.current_generation(), GenerationIndex::FIRST);
        assert_eq!(state.generation_of(&guid("E1")), Some(GenerationIndex::FIRST));
        assert_eq!(
            state.digest(&guid("E1")).map(|(_, d)| d.generation),
            Some(GenerationIndex::FIRST)
        );
        state.check_invariants().unwrap();
    }

    #[test]
    fn commit_of_known_guids_is_refused() {
        let mut state = ExplorationState::new();
        state.commit(OperationKind::GetEntity, "srv", retrieval("E1"), entities(&["E1"]));
        let again = state.commit(
            OperationKind::EntitySearch,
            "srv",
            OperationParams::Search {
                search_text: "E".into(),
                type_filter: None,
            },
            entities(&["E1"]),
        );
        assert_eq!(again, None);
        assert_eq!(state.current_generation(), GenerationIndex::FIRST);
    }

    #[test]
    fn refresh_never_moves_generation() {
        let mut state = ExplorationState::new();
        state.commit(OperationKind::GetEntity, "srv", retrieval("E1"), entities(&["E1"]));
        let renamed = InstanceDigest::new(guid("E1"), "renamed", "Asset", "repo-2")
            .with_generation(GenerationIndex::new(9));

        assert!(state.refresh(&renamed));
        let (_, stored) = state.digest(&guid("E1")).unwrap();
        assert_eq!(stored.label, "renamed");
        assert_eq!(stored.generation, GenerationIndex::FIRST);
        assert!(!state.refresh(&digest("unknown")));
    }

    #[test]
    fn pop_removes_index_entries_and_focus() {
        let mut state = ExplorationState::new();
        state.commit(OperationKind::GetEntity, "srv", retrieval("E1"), entities(&["E1"]));
        state.commit(OperationKind::GetEntity, "srv", retrieval("E2"), entities(&["E2"]));
        assert!(state.set_focus(FocusInstance {
            guid: guid("E2"),
            category: InstanceCategory::Entity,
            expanded_detail: serde_json::Value::Null,
        }));

        let popped = state.pop().unwrap();
        assert!(popped.focus_cleared);
        assert_eq!(popped.generation.index, GenerationIndex::new(2));
        assert!(state.focus().is_none());
        assert!(!state.contains(&guid("E2")));
        state.check_invariants().unwrap();

        state.pop();
        assert!(state.pop().is_none());
        assert_eq!(state.current_generation(), GenerationIndex::NONE);
    }

    #[test]
    fn focus_requires_known_guid() {
        let mut state = ExplorationState::new();
        assert!(!state.set_focus(FocusInstance {
            guid: guid("E1"),
            category: InstanceCategory::Entity,
            expanded_detail: serde_json::Value::Null,
        }));
        assert!(state.focus().is_none());
    }

    #[test]
    fn invariant_check_detects_tampering() {
        let mut state = ExplorationState::new();
        state.commit(OperationKind::GetEntity, "srv", retrieval("E1"), entities(&["E1"]));
        state.guid_index.insert(guid("ghost"), GenerationIndex::FIRST);
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::IndexMismatch { .. })
        ));
    }
}
