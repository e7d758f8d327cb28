//! Identifier types
//!
//! [`Guid`] wraps the repository's instance identifier and rejects blank
//! values at construction (including deserialization). [`GenerationIndex`]
//! numbers discovery batches from 1; zero means "not assigned".

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Globally unique identifier of an entity or relationship instance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid(String);

impl Guid {
    /// Create a guid, rejecting blank input
    ///
    /// # Errors
    /// Returns [`TypeError::BlankGuid`] if `value` is empty or whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TypeError::BlankGuid);
        }
        Ok(Self(value))
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Guid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Guid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a generation in the exploration stack
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GenerationIndex(u32);

impl GenerationIndex {
    /// No generation (empty stack, or digest not yet committed)
    pub const NONE: Self = Self(0);

    /// The first generation of a session
    pub const FIRST: Self = Self(1);

    /// Wrap a raw index
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this is [`GenerationIndex::NONE`]
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The index a newly committed generation would receive
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The index below this one, never underflowing past [`GenerationIndex::NONE`]
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Zero-based slot in a generation vector, `None` for [`GenerationIndex::NONE`]
    #[inline]
    #[must_use]
    pub fn slot(self) -> Option<usize> {
        self.0.checked_sub(1).map(|s| s as usize)
    }
}

impl fmt::Display for GenerationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_rejects_blank() {
        assert_eq!(Guid::new(""), Err(TypeError::BlankGuid));
        assert_eq!(Guid::new("   "), Err(TypeError::BlankGuid));
        assert!(Guid::new("abc-123").is_ok());
    }

    #[test]
    fn guid_deserialize_validates() {
        let ok: Result<Guid, _> = serde_json::from_str("\"E1\"");
        assert_eq!(ok.unwrap().as_str(), "E1");

        let blank: Result<Guid, _> = serde_json::from_str("\"  \"");
        assert!(blank.is_err());
    }

    #[test]
    fn generation_index_navigation() {
        assert!(GenerationIndex::NONE.is_none());
        assert_eq!(GenerationIndex::NONE.next(), GenerationIndex::FIRST);
        assert_eq!(GenerationIndex::FIRST.prev(), GenerationIndex::NONE);
        assert_eq!(GenerationIndex::NONE.prev(), GenerationIndex::NONE);
        assert_eq!(GenerationIndex::new(3).slot(), Some(2));
        assert_eq!(GenerationIndex::NONE.slot(), None);
    }
}
