//! Error types for the controller crate.

use parley_core::PlannerId;
use parley_journal::JournalError;
use parley_planner::PlannerError;
use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Controller error types.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// An operation needs a running controller.
    #[error("controller is not started")]
    NotStarted,

    /// Building a scheduling engine failed.
    #[error("failed to build engine for '{planner_id}': {reason}")]
    EngineConstruction { planner_id: PlannerId, reason: String },

    /// The dismissal append failed for a reason other than a CAS conflict.
    #[error("dismissal failed: {reason}")]
    Dismissal { reason: String },

    /// Planner error.
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// Journal error.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] parley_core::Error),
}

impl ControllerError {
    /// Create an engine construction error.
    pub fn engine_construction(planner_id: PlannerId, reason: impl Into<String>) -> Self {
        Self::EngineConstruction {
            planner_id,
            reason: reason.into(),
        }
    }

    /// Create a dismissal error.
    pub fn dismissal(reason: impl Into<String>) -> Self {
        Self::Dismissal {
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

    #[test]
    fn test_error_display() {
        let err = ControllerError::engine_construction(PlannerId::from_static("demo"), "boom");
        assert_eq!(err.to_string(), "failed to build engine for 'demo': boom");
    }

    #[test]
    fn test_planner_conversion() {
        let err: ControllerError = PlannerError::NoRuntime.into();
        assert!(matches!(err, ControllerError::Planner(PlannerError::NoRuntime)));
    }
}
