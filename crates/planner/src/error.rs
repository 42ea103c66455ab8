//! Error types for the planner crate.

use parley_core::PlannerId;
use parley_journal::JournalError;
use thiserror::Error;

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Planner error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlannerError {
    /// No planner with this id is registered.
    #[error("unknown planner '{planner_id}'")]
    UnknownPlanner { planner_id: PlannerId },

    /// Applied configuration could not be mapped to a harness configuration.
    #[error("config mapping for '{planner_id}' failed: {reason}")]
    ConfigMapping { planner_id: PlannerId, reason: String },

    /// The upstream provider failed.
    #[error("provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    /// A planning pass failed.
    #[error("planner '{planner_id}' failed: {reason}")]
    PlanFailed { planner_id: PlannerId, reason: String },

    /// A pass was requested outside a tokio runtime.
    #[error("no async runtime available to run a planning pass")]
    NoRuntime,

    /// Journal error.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl PlannerError {
    /// Create an unknown planner error.
    pub fn unknown_planner(planner_id: PlannerId) -> Self {
        Self::UnknownPlanner { planner_id }
    }

    /// Create a config mapping error.
    pub fn config_mapping(planner_id: PlannerId, reason: impl Into<String>) -> Self {
        Self::ConfigMapping {
            planner_id,
            reason: reason.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a plan failed error.
    pub fn plan_failed(planner_id: PlannerId, reason: impl Into<String>) -> Self {
        Self::PlanFailed {
            planner_id,
            reason: reason.into(),
        }
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
    use parley_core::Seq;

    #[test]
    fn test_error_display() {
        let err = PlannerError::unknown_planner(PlannerId::from_static("ghost"));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_journal_conversion() {
        let err: PlannerError = JournalError::cas_conflict(Seq::new(1), Seq::new(2)).into();
        assert!(matches!(err, PlannerError::Journal(_)));
        assert!(err.to_string().contains("expected head 1"));
    }
}
