//! Error types for the exploration engine
//!
//! Provides error handling for:
//! - Pre-flight validation (never reaches the gateway)
//! - Gateway failures (state left untouched)
//! - Configuration loading
//!
//! Stale responses are not errors; they surface as
//! [`MergeOutcome::Discarded`](crate::merge::MergeOutcome::Discarded).

use rex_gateway::GatewayError;
use rex_types::{Guid, TypeError};

/// Main engine error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExploreError {
    /// Request rejected before contacting the gateway
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Gateway call failed
    #[error("gateway failed: {0}")]
    Gateway(#[from] GatewayError),
}

impl ExploreError {
    /// Check if error was raised locally
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Gateway(e) => e.is_retryable(),
        }
    }
}

/// Pre-flight validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Guid was missing or blank
    #[error("guid must not be blank")]
    BlankGuid,

    /// No server context established
    #[error("no server connected")]
    NoServer,

    /// Server context lacks a name or URL root
    #[error("server context is missing its name or URL root")]
    IncompleteServer,

    /// Operation needs a focus instance
    #[error("no focus instance")]
    NoFocus,

    /// Operation needs the focus to be an entity
    #[error("focus {guid} is a relationship; exploration starts from an entity")]
    FocusNotEntity {
        /// Focused relationship
        guid: Guid,
    },

    /// Exploration requested from an entity other than the focus
    #[error("{requested} is not the focus entity {focus}")]
    NotFocus {
        /// Requested root
        requested: Guid,
        /// Current focus
        focus: Guid,
    },

    /// Depth out of range
    #[error("depth {depth} outside 1..={max}")]
    InvalidDepth {
        /// Requested depth
        depth: u32,
        /// Configured maximum
        max: u32,
    },

    /// Undo requested with no generations (when configured to reject)
    #[error("nothing to undo")]
    EmptyUndo,

    /// Search text was blank
    #[error("search text must not be blank")]
    BlankSearchText,

    /// Type or classification name not known
    #[error("unknown type: {name}")]
    UnknownType {
        /// The name
        name: String,
    },
}

impl From<TypeError> for ValidationError {
    fn from(value: TypeError) -> Self {
        match value {
            TypeError::BlankGuid => Self::BlankGuid,
            TypeError::UnknownType { name } | TypeError::UnknownCategory(name) => {
                Self::UnknownType { name }
            }
        }
    }
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not match the schema
    #[error("malformed configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let validation = ExploreError::from(ValidationError::NoServer);
        assert!(validation.is_validation());
        assert!(!validation.is_retryable());

        let gateway = ExploreError::from(GatewayError::Transport("reset".into()));
        assert!(!gateway.is_validation());
        assert!(gateway.is_retryable());
    }

    #[test]
    fn type_error_maps_to_validation() {
        assert_eq!(
            ValidationError::from(TypeError::BlankGuid),
            ValidationError::BlankGuid
        );
        assert_eq!(
            ValidationError::from(TypeError::UnknownType {
                name: "Asset".into()
            }),
            ValidationError::UnknownType {
                name: "Asset".into()
            }
        );
    }

    #[test]
    fn not_focus_names_both_guids() {
        let err = ValidationError::NotFocus {
            requested: Guid::new("E2").unwrap(),
            focus: Guid::new("E1").unwrap(),
        };
        assert_eq!(err.to_string(), "E2 is not the focus entity E1");
    }
}
