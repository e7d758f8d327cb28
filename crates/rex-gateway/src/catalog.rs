//! Type catalog read interface
//!
//! The engine never fetches type definitions itself; it only resolves type
//! names to guids when building search filters.

use indexmap::IndexMap;
use rex_types::TypeRef;

/// Read-only access to known type names and guids
pub trait TypeCatalog: Send + Sync {
    /// Look up an entity type by name
    fn entity_type(&self, name: &str) -> Option<TypeRef>;

    /// Look up a relationship type by name
    fn relationship_type(&self, name: &str) -> Option<TypeRef>;

    /// Entity type names, sorted
    fn entity_type_names(&self) -> Vec<String>;

    /// Relationship type names, sorted
    fn relationship_type_names(&self) -> Vec<String>;

    /// Classification names, sorted
    fn classification_names(&self) -> Vec<String>;
}

/// Catalog backed by in-memory maps
#[derive(Debug, Clone, Default)]
pub struct MemoryTypeCatalog {
    entity_types: IndexMap<String, TypeRef>,
    relationship_types: IndexMap<String, TypeRef>,
    classifications: Vec<String>,
}

impl MemoryTypeCatalog {
    /// Empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type
    #[must_use]
    pub fn with_entity_type(mut self, type_ref: TypeRef) -> Self {
        self.entity_types.insert(type_ref.name.clone(), type_ref);
        self
    }

    /// Register a relationship type
    #[must_use]
    pub fn with_relationship_type(mut self, type_ref: TypeRef) -> Self {
        self.relationship_types.insert(type_ref.name.clone(), type_ref);
        self
    }

    /// Register a classification name
    #[must_use]
    pub fn with_classification(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.classifications.contains(&name) {
            self.classifications.push(name);
        }
        self
    }

    /// Guid of an entity or relationship type by name, whichever matches
    #[must_use]
    pub fn type_guid(&self, name: &str) -> Option<&str> {
        self.entity_types
            .get(name)
            .or_else(|| self.relationship_types.get(name))
            .map(|t| t.guid.as_str())
    }
}

impl TypeCatalog for MemoryTypeCatalog {
    fn entity_type(&self, name: &str) -> Option<TypeRef> {
        self.entity_types.get(name).cloned()
    }

    fn relationship_type(&self, name: &str) -> Option<TypeRef> {
        self.relationship_types.get(name).cloned()
    }

    fn entity_type_names(&self) -> Vec<String> {
        sorted(self.entity_types.keys())
    }

    fn relationship_type_names(&self) -> Vec<String> {
        sorted(self.relationship_types.keys())
    }

    fn classification_names(&self) -> Vec<String> {
        sorted(self.classifications.iter())
    }
}

fn sorted<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut names: Vec<String> = names.cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_listing() {
        let catalog = MemoryTypeCatalog::new()
            .with_entity_type(TypeRef::new("GlossaryTerm", "t-term"))
            .with_entity_type(TypeRef::new("Asset", "t-asset"))
            .with_relationship_type(TypeRef::new("TermAnchor", "t-anchor"))
            .with_classification("Confidentiality")
            .with_classification("Confidentiality");

        assert_eq!(catalog.entity_type("Asset").map(|t| t.guid), Some("t-asset".into()));
        assert!(catalog.entity_type("TermAnchor").is_none());
        assert_eq!(catalog.entity_type_names(), vec!["Asset", "GlossaryTerm"]);
        assert_eq!(catalog.classification_names(), vec!["Confidentiality"]);
        assert_eq!(catalog.type_guid("TermAnchor"), Some("t-anchor"));
    }
}
