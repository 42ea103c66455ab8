//! Planner status reporting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the planner as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    /// Nothing running.
    #[default]
    Idle,
    /// A planning pass is running.
    Planning,
    /// Planner output is being appended.
    Applying,
    /// The last pass failed.
    Error,
}

impl std::fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Planning => write!(f, "planning"),
            Self::Applying => write!(f, "applying"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Latest status reported by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub phase: PlanPhase,
    pub label: Option<String>,
    /// Fraction in `0.0..=1.0`.
    pub progress: Option<f32>,
    pub updated_at: DateTime<Utc>,
}

impl StatusReport {
    /// Create a report stamped now. Progress is clamped to `0.0..=1.0`.
    pub fn new(phase: PlanPhase, label: Option<String>, progress: Option<f32>) -> Self {
        Self {
            phase,
            label,
            progress: progress.map(|p| p.clamp(0.0, 1.0)),
            updated_at: Utc::now(),
        }
    }
}

impl Default for StatusReport {
    fn default() -> Self {
        Self::new(PlanPhase::Idle, None, None)
    }
}

/// Sink for planner status updates.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Replace the current status.
    async fn set_status(&self, phase: PlanPhase, label: Option<String>, progress: Option<f32>);
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
    fn should_clamp_progress() {
        let report = StatusReport::new(PlanPhase::Planning, None, Some(1.5));
        assert_eq!(report.progress, Some(1.0));
    }

    #[test]
    fn should_default_to_idle() {
        assert_eq!(StatusReport::default().phase, PlanPhase::Idle);
        assert_eq!(PlanPhase::Applying.to_string(), "applying");
    }
}
