//! Observability for controller decisions.
//!
//! Every failure the controller recovers from is reported here instead of
//! being dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parley_core::{EngineId, PlannerId, Seq};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dismissal::DismissOutcome;

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PassReason {
    /// Initial kick of a freshly built engine.
    EngineBuilt,
    /// The journal head moved.
    SequenceChanged { seq: Seq },
}

/// Something the controller did or failed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    EngineBuilt {
        engine_id: EngineId,
        planner_id: PlannerId,
        generation: u64,
    },
    RebuildFailed {
        planner_id: Option<PlannerId>,
        reason: String,
    },
    PassRequested {
        engine_id: EngineId,
        reason: PassReason,
    },
    ScheduleFailed {
        engine_id: EngineId,
        reason: String,
    },
    Dismissal {
        outcome: DismissOutcome,
    },
    DismissalFailed {
        reason: String,
    },
    /// The transition stream dropped `skipped` transitions.
    Lagged {
        skipped: u64,
    },
}

/// Receives controller events.
pub trait ControllerObserver: Send + Sync {
    fn on_event(&self, event: &ControllerEvent);
}

/// Logs every event with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ControllerObserver for TracingObserver {
    fn on_event(&self, event: &ControllerEvent) {
        match event {
            ControllerEvent::EngineBuilt {
                engine_id,
                planner_id,
                generation,
            } => info!(
                engine_id = %engine_id,
                planner_id = %planner_id,
                generation,
                "Engine built"
            ),
            ControllerEvent::RebuildFailed { planner_id, reason } => warn!(
                planner_id = ?planner_id.as_ref().map(PlannerId::as_str),
                reason = %reason,
                "Engine rebuild failed, keeping previous engine"
            ),
            ControllerEvent::PassRequested { engine_id, reason } => {
                debug!(engine_id = %engine_id, reason = ?reason, "Pass requested");
            }
            ControllerEvent::ScheduleFailed { engine_id, reason } => {
                warn!(engine_id = %engine_id, reason = %reason, "Pass request failed");
            }
            ControllerEvent::Dismissal { outcome } => {
                debug!(outcome = ?outcome, "Dismissal reconciled");
            }
            ControllerEvent::DismissalFailed { reason } => {
                warn!(reason = %reason, "Dismissal failed");
            }
            ControllerEvent::Lagged { skipped } => {
                warn!(skipped, "Transition stream lagged, resynchronising");
            }
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerMetrics {
    pub engines_built: u64,
    pub rebuild_failures: u64,
    pub passes_requested: u64,
    pub schedule_failures: u64,
    pub dismissals: u64,
    pub dismissal_conflicts: u64,
    pub dismissal_failures: u64,
    pub lagged: u64,
}

/// Counts events.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    engines_built: AtomicU64,
    rebuild_failures: AtomicU64,
    passes_requested: AtomicU64,
    schedule_failures: AtomicU64,
    dismissals: AtomicU64,
    dismissal_conflicts: AtomicU64,
    dismissal_failures: AtomicU64,
    lagged: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    pub fn snapshot(&self) -> ControllerMetrics {
        ControllerMetrics {
            engines_built: self.engines_built.load(Ordering::Relaxed),
            rebuild_failures: self.rebuild_failures.load(Ordering::Relaxed),
            passes_requested: self.passes_requested.load(Ordering::Relaxed),
            schedule_failures: self.schedule_failures.load(Ordering::Relaxed),
            dismissals: self.dismissals.load(Ordering::Relaxed),
            dismissal_conflicts: self.dismissal_conflicts.load(Ordering::Relaxed),
            dismissal_failures: self.dismissal_failures.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
        }
    }
}

impl ControllerObserver for MetricsObserver {
    fn on_event(&self, event: &ControllerEvent) {
        let counter = match event {
            ControllerEvent::EngineBuilt { .. } => &self.engines_built,
            ControllerEvent::RebuildFailed { .. } => &self.rebuild_failures,
            ControllerEvent::PassRequested { .. } => &self.passes_requested,
            ControllerEvent::ScheduleFailed { .. } => &self.schedule_failures,
            ControllerEvent::Dismissal {
                outcome: DismissOutcome::Dismissed { .. },
            } => &self.dismissals,
            ControllerEvent::Dismissal {
                outcome: DismissOutcome::Conflict { .. },
            } => &self.dismissal_conflicts,
            ControllerEvent::Dismissal { .. } => return,
            ControllerEvent::DismissalFailed { .. } => &self.dismissal_failures,
            ControllerEvent::Lagged { .. } => &self.lagged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Forwards every event to each observer in turn.
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ControllerObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: Arc<dyn ControllerObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl ControllerObserver for FanoutObserver {
    fn on_event(&self, event: &ControllerEvent) {
        for observer in &self.observers {
            observer.on_event(event);
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
    use parley_core::ComposeId;

    #[test]
    fn should_count_dismissal_outcomes_separately() {
        let metrics = MetricsObserver::new();
        metrics.on_event(&ControllerEvent::Dismissal {
            outcome: DismissOutcome::Dismissed {
                compose_id: ComposeId::new("a"),
                head: Seq::new(2),
            },
        });
        metrics.on_event(&ControllerEvent::Dismissal {
            outcome: DismissOutcome::Conflict {
                compose_id: ComposeId::new("a"),
                expected: Seq::new(1),
                actual: Seq::new(2),
            },
        });
        metrics.on_event(&ControllerEvent::Dismissal {
            outcome: DismissOutcome::HorizonReached,
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dismissals, 1);
        assert_eq!(snapshot.dismissal_conflicts, 1);
        assert_eq!(snapshot.dismissal_failures, 0);
    }

    #[test]
    fn should_fan_out_to_every_observer() {
        let first = Arc::new(MetricsObserver::new());
        let second = Arc::new(MetricsObserver::new());
        let fanout = FanoutObserver::new()
            .with(Arc::clone(&first) as Arc<dyn ControllerObserver>)
            .with(Arc::clone(&second) as Arc<dyn ControllerObserver>)
            .with(Arc::new(TracingObserver));

        fanout.on_event(&ControllerEvent::Lagged { skipped: 3 });

        assert_eq!(first.snapshot().lagged, 1);
        assert_eq!(second.snapshot().lagged, 1);
    }
}
