//! Pre-traversal statistics and traversal filters
//!
//! A pre-traversal reports, per type, how many instances a traversal would
//! reach. The filter UI picks names from those stats; [`TraversalFilter::from_stats`]
//! turns the picks into the GUID-bearing lists the traversal call expects.

use crate::error::TypeError;
use crate::ids::Guid;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Count of instances of one entity or relationship type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    /// Number of instances reachable
    pub count: u64,
    /// Guid of the type definition
    pub type_guid: String,
}

/// Count of instances carrying one classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCount {
    /// Number of classified instances reachable
    pub count: u64,
}

/// Advisory output of a pre-traversal, keyed by type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreTraversalStats {
    /// Root entity of the prospective traversal
    pub entity_guid: Guid,
    /// Depth that was analysed
    pub depth: u32,
    /// Entity type name -> count
    #[serde(default)]
    pub per_entity_type: IndexMap<String, TypeCount>,
    /// Relationship type name -> count
    #[serde(default)]
    pub per_relationship_type: IndexMap<String, TypeCount>,
    /// Classification name -> count
    #[serde(default)]
    pub per_classification: IndexMap<String, ClassificationCount>,
}

impl PreTraversalStats {
    /// Empty stats for a root and depth
    #[must_use]
    pub fn new(entity_guid: Guid, depth: u32) -> Self {
        Self {
            entity_guid,
            depth,
            per_entity_type: IndexMap::new(),
            per_relationship_type: IndexMap::new(),
            per_classification: IndexMap::new(),
        }
    }

    /// Total entities across all types
    #[must_use]
    pub fn entity_total(&self) -> u64 {
        self.per_entity_type.values().map(|c| c.count).sum()
    }

    /// Total relationships across all types
    #[must_use]
    pub fn relationship_total(&self) -> u64 {
        self.per_relationship_type.values().map(|c| c.count).sum()
    }

    /// Whether the traversal would reach nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_total() == 0 && self.relationship_total() == 0
    }
}

/// A type referenced by name and definition guid
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Type name
    pub name: String,
    /// Type definition guid
    pub guid: String,
}

impl TypeRef {
    /// Create a type reference
    #[must_use]
    pub fn new(name: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: guid.into(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Filters applied to a traversal; empty lists mean "no restriction"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalFilter {
    /// Entity types to include
    #[serde(default)]
    pub entity_types: Vec<TypeRef>,
    /// Relationship types to include
    #[serde(default)]
    pub relationship_types: Vec<TypeRef>,
    /// Classification names to include
    #[serde(default)]
    pub classifications: Vec<String>,
}

impl TraversalFilter {
    /// No filtering
    #[inline]
    #[must_use]
    pub fn unfiltered() -> Self {
        Self::default()
    }

    /// Whether every list is empty
    #[inline]
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.entity_types.is_empty()
            && self.relationship_types.is_empty()
            && self.classifications.is_empty()
    }

    /// Build a filter from selected names, resolving type guids through the stats
    ///
    /// # Errors
    /// Returns [`TypeError::UnknownType`] for the first selected name the
    /// stats do not report.
    pub fn from_stats<S: AsRef<str>>(
        stats: &PreTraversalStats,
        entity_names: &[S],
        relationship_names: &[S],
        classification_names: &[S],
    ) -> Result<Self, TypeError> {
        let entity_types = resolve(&stats.per_entity_type, entity_names)?;
        let relationship_types = resolve(&stats.per_relationship_type, relationship_names)?;

        let mut classifications = Vec::with_capacity(classification_names.len());
        for name in classification_names {
            let name = name.as_ref();
            if !stats.per_classification.contains_key(name) {
                return Err(TypeError::UnknownType {
                    name: name.to_string(),
                });
            }
            if !classifications.iter().any(|c| c == name) {
                classifications.push(name.to_string());
            }
        }

        Ok(Self {
            entity_types,
            relationship_types,
            classifications,
        })
    }

    /// Entity type guids, in selection order
    #[must_use]
    pub fn entity_type_guids(&self) -> Vec<&str> {
        self.entity_types.iter().map(|t| t.guid.as_str()).collect()
    }

    /// Relationship type guids, in selection order
    #[must_use]
    pub fn relationship_type_guids(&self) -> Vec<&str> {
        self.relationship_types.iter().map(|t| t.guid.as_str()).collect()
    }
}

fn resolve<S: AsRef<str>>(
    counts: &IndexMap<String, TypeCount>,
    names: &[S],
) -> Result<Vec<TypeRef>, TypeError> {
    let mut refs: Vec<TypeRef> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        let count = counts.get(name).ok_or_else(|| TypeError::UnknownType {
            name: name.to_string(),
        })?;
        if !refs.iter().any(|r| r.name == name) {
            refs.push(TypeRef::new(name, count.type_guid.clone()));
        }
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_stats() -> PreTraversalStats {
        let mut stats = PreTraversalStats::new(Guid::new("E1").unwrap(), 1);
        stats.per_entity_type.insert(
            "GlossaryTerm".into(),
            TypeCount {
                count: 3,
                type_guid: "t-term".into(),
            },
        );
        stats.per_relationship_type.insert(
            "TermAnchor".into(),
            TypeCount {
                count: 3,
                type_guid: "t-anchor".into(),
            },
        );
        stats
            .per_classification
            .insert("Confidentiality".into(), ClassificationCount { count: 1 });
        stats
    }

    #[test]
    fn from_stats_resolves_guids() {
        let stats = sample_stats();
        let filter = TraversalFilter::from_stats(
            &stats,
            &["GlossaryTerm", "GlossaryTerm"],
            &["TermAnchor"],
            &["Confidentiality"],
        )
        .unwrap();

        assert_eq!(filter.entity_types, vec![TypeRef::new("GlossaryTerm", "t-term")]);
        assert_eq!(filter.relationship_type_guids(), vec!["t-anchor"]);
        assert_eq!(filter.classifications, vec!["Confidentiality".to_string()]);
        assert!(!filter.is_unfiltered());
    }

    #[test]
    fn from_stats_rejects_unknown_names() {
        let stats = sample_stats();
        let err = TraversalFilter::from_stats(&stats, &["Asset"], &[], &[]).unwrap_err();
        assert_eq!(
            err,
            TypeError::UnknownType {
                name: "Asset".into()
            }
        );
    }

    #[test]
    fn totals() {
        let stats = sample_stats();
        assert_eq!(stats.entity_total(), 3);
        assert_eq!(stats.relationship_total(), 3);
        assert!(!stats.is_empty());
        assert!(PreTraversalStats::new(Guid::new("E9").unwrap(), 2).is_empty());
    }
}
