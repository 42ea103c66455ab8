//! Error types for the journal crate.

use parley_core::Seq;
use thiserror::Error;

/// Result type alias for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Journal error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// The head advanced between observation and apply.
    #[error("append rejected: expected head {expected}, journal is at {actual}")]
    CasConflict { expected: Seq, actual: Seq },

    /// The transition channel was closed.
    #[error("transition channel closed")]
    ChannelClosed,

    /// The subscriber fell behind and missed transitions.
    #[error("subscriber lagged, {skipped} transitions skipped")]
    Lagged { skipped: u64 },
}

impl JournalError {
    /// Create a CAS conflict error.
    pub const fn cas_conflict(expected: Seq, actual: Seq) -> Self {
        Self::CasConflict { expected, actual }
    }

    /// Whether this is a benign CAS race rather than a failure.
    pub const fn is_cas_conflict(&self) -> bool {
        matches!(self, Self::CasConflict { .. })
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
    fn test_cas_conflict_display() {
        let err = JournalError::cas_conflict(Seq::new(1), Seq::new(2));
        let text = err.to_string();
        assert!(text.contains("expected head 1"));
        assert!(text.contains("at 2"));
        assert!(err.is_cas_conflict());
    }

    #[test]
    fn test_lagged_is_not_conflict() {
        assert!(!JournalError::Lagged { skipped: 3 }.is_cas_conflict());
    }
}
