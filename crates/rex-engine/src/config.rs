//! Engine configuration

use crate::error::ConfigError;
use rex_types::ServerContext;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Exploration engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    /// Depth offered to callers that do not choose one
    pub default_depth: u32,
    /// Largest depth accepted for traversal and pre-traversal
    pub max_traversal_depth: u32,
    /// Default enterprise scope for new server contexts
    pub enterprise_option: bool,
    /// Undo on an empty stack returns an error instead of doing nothing
    pub reject_empty_undo: bool,
    /// Focus the instance when exactly one search result is committed
    pub focus_single_search_selection: bool,
}

impl ExplorerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With maximum traversal depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max: u32) -> Self {
        self.max_traversal_depth = max;
        self
    }

    /// With empty-undo rejection
    #[inline]
    #[must_use]
    pub fn with_reject_empty_undo(mut self, reject: bool) -> Self {
        self.reject_empty_undo = reject;
        self
    }

    /// With single-selection focus
    #[inline]
    #[must_use]
    pub fn with_focus_single_search_selection(mut self, focus: bool) -> Self {
        self.focus_single_search_selection = focus;
        self
    }

    /// With enterprise scope default
    #[inline]
    #[must_use]
    pub fn with_enterprise_option(mut self, enterprise: bool) -> Self {
        self.enterprise_option = enterprise;
        self
    }

    /// Server context carrying this configuration's enterprise default
    #[must_use]
    pub fn server(&self, name: impl Into<String>, url_root: impl Into<String>) -> ServerContext {
        ServerContext::new(name, url_root).with_enterprise(self.enterprise_option)
    }

    /// Parse TOML and validate
    ///
    /// # Errors
    /// Returns [`ConfigError`] for malformed TOML, unknown keys or inconsistent values.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load TOML from a file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml)
    }

    /// Check value consistency
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the depth bounds are unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_traversal_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_traversal_depth must be at least 1".to_string(),
            ));
        }
        if self.default_depth == 0 || self.default_depth > self.max_traversal_depth {
            return Err(ConfigError::Invalid(format!(
                "default_depth {} outside 1..={}",
                self.default_depth, self.max_traversal_depth
            )));
        }
        Ok(())
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            default_depth: 1,
            max_traversal_depth: 5,
            enterprise_option: false,
            reject_empty_undo: false,
            focus_single_search_selection: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ExplorerConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_depth, 1);
        assert!(!config.reject_empty_undo);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ExplorerConfig::from_toml_str("max_traversal_depth = 3\nreject_empty_undo = true\n")
            .unwrap();
        assert_eq!(config.max_traversal_depth, 3);
        assert!(config.reject_empty_undo);
        assert!(config.focus_single_search_selection);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = ExplorerConfig::from_toml_str("max_depth = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn inconsistent_depths_rejected() {
        let err = ExplorerConfig::from_toml_str("default_depth = 4\nmax_traversal_depth = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn server_inherits_enterprise_default() {
        let config = ExplorerConfig::new().with_enterprise_option(true);
        let server = config.server("cocoMDS1", "https://localhost:9443");
        assert!(server.enterprise_option);
        assert!(server.is_complete());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enterprise_option = true").unwrap();
        let config = ExplorerConfig::from_file(file.path()).unwrap();
        assert!(config.enterprise_option);
    }
}
