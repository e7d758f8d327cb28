//! Error types for the gateway
//!
//! [`GatewayError`] covers everything a remote call can report; the engine
//! surfaces its [`message`](GatewayError::message) in failure notifications.
//! [`FixtureError`] covers loading an in-memory repository.

use rex_types::{Guid, InstanceCategory};
use std::time::Duration;

/// Failure of a gateway call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Network or proxy failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Backend reported a failure
    #[error("backend returned {status}: {message}")]
    Backend {
        /// HTTP-equivalent status code
        status: u16,
        /// Backend message
        message: String,
    },

    /// Requested instance does not exist (or is out of scope)
    #[error("{category} {guid} not found")]
    NotFound {
        /// Entity or relationship
        category: InstanceCategory,
        /// Requested guid
        guid: Guid,
    },

    /// Search text was not a valid expression
    #[error("invalid search expression: {0}")]
    InvalidSearch(String),

    /// Response describes a different instance than the one requested
    #[error("requested {requested} but response described {}", .returned.as_ref().map_or("nothing", Guid::as_str))]
    UnexpectedInstance {
        /// Requested guid
        requested: Guid,
        /// Guid in the response, if any
        returned: Option<Guid>,
    },

    /// Call exceeded its deadline
    #[error("request timed out after {duration_ms}ms")]
    Timeout {
        /// Elapsed time in milliseconds
        duration_ms: u64,
    },
}

impl GatewayError {
    /// Timeout from a duration
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Human-readable message for failure notifications
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Check if a retry could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Backend { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::InvalidSearch(_) | Self::UnexpectedInstance { .. } => {
                false
            }
        }
    }
}

/// Failure loading a repository fixture
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// Fixture could not be read
    #[error("cannot read fixture: {0}")]
    Io(#[from] std::io::Error),

    /// Fixture is not valid JSON for the schema
    #[error("malformed fixture: {0}")]
    Json(#[from] serde_json::Error),

    /// Guid appears twice
    #[error("duplicate guid {0}")]
    DuplicateGuid(Guid),

    /// Relationship end refers to a missing entity
    #[error("relationship {relationship} refers to unknown entity {end}")]
    DanglingEnd {
        /// Relationship guid
        relationship: Guid,
        /// Missing end guid
        end: Guid,
    },

    /// Instance uses a type the fixture does not declare
    #[error("instance {guid} has undeclared type {type_name}")]
    UndeclaredType {
        /// Instance guid
        guid: Guid,
        /// Type name
        type_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GatewayError::Transport("reset".into()).is_retryable());
        assert!(GatewayError::timeout(Duration::from_secs(2)).is_retryable());
        assert!(GatewayError::Backend {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!GatewayError::Backend {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!GatewayError::InvalidSearch("(".into()).is_retryable());
        assert!(!GatewayError::UnexpectedInstance {
            requested: Guid::new("E1").unwrap(),
            returned: None,
        }
        .is_retryable());
    }

    #[test]
    fn message_includes_detail() {
        let err = GatewayError::NotFound {
            category: InstanceCategory::Entity,
            guid: Guid::new("E404").unwrap(),
        };
        assert_eq!(err.message(), "entity E404 not found");
        assert_eq!(
            GatewayError::timeout(Duration::from_millis(1500)).message(),
            "request timed out after 1500ms"
        );
        assert_eq!(
            GatewayError::UnexpectedInstance {
                requested: Guid::new("E1").unwrap(),
                returned: Some(Guid::new("E2").unwrap()),
            }
            .message(),
            "requested E1 but response described E2"
        );
    }
}
