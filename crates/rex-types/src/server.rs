//! Server coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinates of the metadata server currently being explored
///
/// Treated as an immutable value per request; two contexts are the same
/// server only if all three fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerContext {
    /// Server name
    pub server_name: String,
    /// Platform URL root
    pub server_url_root: String,
    /// Federate queries across the cohort rather than one repository
    #[serde(default)]
    pub enterprise_option: bool,
}

impl ServerContext {
    /// Create a context scoped to the server's local repository
    #[must_use]
    pub fn new(server_name: impl Into<String>, server_url_root: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            server_url_root: server_url_root.into(),
            enterprise_option: false,
        }
    }

    /// With enterprise scope
    #[inline]
    #[must_use]
    pub fn with_enterprise(mut self, enterprise_option: bool) -> Self {
        self.enterprise_option = enterprise_option;
        self
    }

    /// Whether both name and URL root are present
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.server_name.trim().is_empty() && !self.server_url_root.trim().is_empty()
    }
}

impl fmt::Display for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.server_name, self.server_url_root)?;
        if self.enterprise_option {
            f.write_str(" (enterprise)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness() {
        assert!(ServerContext::new("cocoMDS1", "https://localhost:9443").is_complete());
        assert!(!ServerContext::new("", "https://localhost:9443").is_complete());
        assert!(!ServerContext::new("cocoMDS1", " ").is_complete());
    }

    #[test]
    fn enterprise_flag_distinguishes_contexts() {
        let local = ServerContext::new("s", "u");
        let enterprise = local.clone().with_enterprise(true);
        assert_ne!(local, enterprise);
        assert_eq!(enterprise.to_string(), "s@u (enterprise)");
    }
}
