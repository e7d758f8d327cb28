//! Session guard for stale-response detection
//!
//! Every outgoing request captures a [`RequestTicket`]: the server context,
//! the session epoch and the generation current at issue time. Switching
//! servers or clearing advances the epoch, so any response whose ticket no
//! longer matches is discarded without touching state.

use crate::error::ValidationError;
use rex_types::{GenerationIndex, ServerContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique, sortable request identifier (used in logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Ulid);

impl RequestId {
    /// Generate new request ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot captured when a request is issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    /// Request identifier
    pub id: RequestId,
    /// Server the request targets
    pub server: ServerContext,
    /// Session epoch at issue time
    pub epoch: u64,
    /// Generation current at issue time
    pub generation: GenerationIndex,
}

/// Live server context plus session epoch
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    server: Option<ServerContext>,
    epoch: u64,
}

impl SessionGuard {
    /// Disconnected guard at epoch 0
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current server context
    #[inline]
    #[must_use]
    pub fn server(&self) -> Option<&ServerContext> {
        self.server.as_ref()
    }

    /// Current epoch
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Target `server`; returns whether the context changed (and the epoch advanced)
    pub fn connect(&mut self, server: ServerContext) -> bool {
        if self.server.as_ref() == Some(&server) {
            return false;
        }
        self.server = Some(server);
        self.invalidate();
        true
    }

    /// Drop the server context; returns whether one was set
    pub fn disconnect(&mut self) -> bool {
        let had_server = self.server.take().is_some();
        self.invalidate();
        had_server
    }

    /// Advance the epoch so every outstanding ticket becomes stale
    pub fn invalidate(&mut self) {
        self.epoch += 1;
    }

    /// Capture a ticket for a new request
    ///
    /// # Errors
    /// Returns [`ValidationError::NoServer`] when disconnected.
    pub fn issue(&self, generation: GenerationIndex) -> Result<RequestTicket, ValidationError> {
        let server = self.server.clone().ok_or(ValidationError::NoServer)?;
        Ok(RequestTicket {
            id: RequestId::new(),
            server,
            epoch: self.epoch,
            generation,
        })
    }

    /// Whether a response for `ticket` may still be applied
    #[must_use]
    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.epoch == ticket.epoch && self.server.as_ref() == Some(&ticket.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerContext {
        ServerContext::new(name, "https://localhost:9443")
    }

    #[test]
    fn issue_requires_server() {
        let guard = SessionGuard::new();
        assert_eq!(
            guard.issue(GenerationIndex::NONE).unwrap_err(),
            ValidationError::NoServer
        );
    }

    #[test]
    fn reconnecting_same_server_keeps_tickets() {
        let mut guard = SessionGuard::new();
        assert!(guard.connect(server("a")));
        let ticket = guard.issue(GenerationIndex::NONE).unwrap();
        assert!(!guard.connect(server("a")));
        assert!(guard.is_current(&ticket));
    }

    #[test]
    fn switching_server_or_invalidating_stales_tickets() {
        let mut guard = SessionGuard::new();
        guard.connect(server("a"));
        let first = guard.issue(GenerationIndex::NONE).unwrap();
        guard.connect(server("b"));
        assert!(!guard.is_current(&first));

        let second = guard.issue(GenerationIndex::FIRST).unwrap();
        guard.invalidate();
        assert!(!guard.is_current(&second));
    }

    #[test]
    fn switching_back_does_not_revive_old_tickets() {
        let mut guard = SessionGuard::new();
        guard.connect(server("a"));
        let ticket = guard.issue(GenerationIndex::NONE).unwrap();
        guard.connect(server("b"));
        guard.connect(server("a"));
        assert!(!guard.is_current(&ticket));
    }
}
