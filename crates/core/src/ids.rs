//! Identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Error;

/// Stable identifier of a planner capability in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlannerId(String);

impl PlannerId {
    /// Create a planner id, rejecting blank values.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::invalid_identifier(id, "planner id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Create a planner id from a compile-time constant.
    pub fn from_static(id: &'static str) -> Self {
        Self(id.to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the task context the planner works within.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a proposed draft.
///
/// Ids arriving from other writers may be empty; an empty id never names a
/// dismissable draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComposeId(String);

impl ComposeId {
    /// Generate a fresh, time-ordered compose id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether the id is the empty string. Whitespace is a real id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComposeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one scheduling engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(Ulid);

impl EngineId {
    /// Create a new random engine id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Journal sequence number: the count of applied facts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Seq(u64);

impl Seq {
    /// The sequence of an empty journal.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw sequence number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw sequence number.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Sequence after applying `count` more facts.
    pub const fn advanced_by(self, count: u64) -> Self {
        Self(self.0.saturating_add(count))
    }

    /// Sequence for a journal of `len` facts.
    pub fn from_len(len: usize) -> Self {
        Self(u64::try_from(len).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn should_reject_blank_planner_id() {
        assert!(PlannerId::new("  ").is_err());
        assert!(PlannerId::new("simple-demo").is_ok());
    }

    #[test]
    fn should_treat_only_the_empty_compose_id_as_empty() {
        assert!(ComposeId::new("").is_empty());
        assert!(!ComposeId::new(" ").is_empty());
        assert!(!ComposeId::generate().is_empty());
    }

    #[test]
    fn should_advance_seq_without_overflow() {
        assert_eq!(Seq::new(2).advanced_by(3), Seq::new(5));
        assert_eq!(Seq::new(u64::MAX).advanced_by(1), Seq::new(u64::MAX));
    }

    #[test]
    fn should_serialize_ids_transparently() {
        let json = serde_json::to_string(&PlannerId::from_static("nop")).ok();
        assert_eq!(json.as_deref(), Some("\"nop\""));
        let json = serde_json::to_string(&Seq::new(4)).ok();
        assert_eq!(json.as_deref(), Some("4"));
    }
}
