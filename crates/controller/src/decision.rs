//! Rebuild decision over a selection transition.

use parley_journal::Selection;
use serde::Serialize;

/// Which parts of the selection changed in one transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Changes {
    pub planner: bool,
    pub task: bool,
    /// Identity of the readiness map changed.
    pub ready: bool,
    /// Identity of the applied-configuration map changed.
    pub applied: bool,
}

impl Changes {
    /// Compare two selections.
    ///
    /// The maps are compared by identity: a store write that replaces a map
    /// counts as a change even when the contents are equal.
    pub fn between(previous: &Selection, next: &Selection) -> Self {
        Self {
            planner: previous.planner_id != next.planner_id,
            task: previous.task_id != next.task_id,
            ready: !previous.ready_by_planner.ptr_eq(&next.ready_by_planner),
            applied: !previous.applied_by_planner.ptr_eq(&next.applied_by_planner),
        }
    }

    /// Whether anything changed.
    pub const fn any(self) -> bool {
        self.planner || self.task || self.ready || self.applied
    }
}

/// What to do with the current engine after a selection transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildDecision {
    /// Rebuild, then withdraw the latest unsent draft.
    RebuildAndDismiss,
    /// Rebuild only.
    Rebuild,
    /// Leave the engine alone.
    Keep,
}

impl RebuildDecision {
    /// Decide for a transition from `previous` to `next`.
    ///
    /// A new planner or new applied config for a ready planner, within the
    /// same task, rebuilds and dismisses. Any other change rebuilds.
    pub fn evaluate(previous: &Selection, next: &Selection) -> Self {
        Self::from_changes(Changes::between(previous, next), next.active_ready())
    }

    /// Decide from precomputed changes and the readiness of the next planner.
    pub const fn from_changes(changes: Changes, next_ready: bool) -> Self {
        if (changes.planner || changes.applied) && next_ready && !changes.task {
            Self::RebuildAndDismiss
        } else if changes.any() {
            Self::Rebuild
        } else {
            Self::Keep
        }
    }

    /// Whether the engine is replaced.
    pub const fn rebuilds(self) -> bool {
        !matches!(self, Self::Keep)
    }

    /// Whether the dismissal runs after the rebuild.
    pub const fn dismisses(self) -> bool {
        matches!(self, Self::RebuildAndDismiss)
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
    use parley_core::{PlannerId, TaskId};
    use parley_journal::AppliedConfig;

    fn demo() -> PlannerId {
        PlannerId::from_static("simple-demo")
    }

    fn ready_selection() -> Selection {
        let mut selection = Selection::new();
        selection.planner_id = Some(demo());
        selection.ready_by_planner.insert(demo(), true);
        selection
    }

    #[test]
    fn should_keep_engine_when_nothing_changed() {
        let selection = ready_selection();
        let next = selection.clone();
        assert_eq!(RebuildDecision::evaluate(&selection, &next), RebuildDecision::Keep);
    }

    #[test]
    fn should_rebuild_and_dismiss_on_switch_to_ready_planner() {
        let mut previous = Selection::new();
        previous.ready_by_planner.insert(demo(), true);
        let mut next = previous.clone();
        next.planner_id = Some(demo());

        assert_eq!(
            RebuildDecision::evaluate(&previous, &next),
            RebuildDecision::RebuildAndDismiss
        );
    }

    #[test]
    fn should_rebuild_and_dismiss_on_applied_config_change() {
        let previous = ready_selection();
        let mut next = previous.clone();
        next.applied_by_planner
            .insert(demo(), AppliedConfig::with_model("m"));

        assert_eq!(
            RebuildDecision::evaluate(&previous, &next),
            RebuildDecision::RebuildAndDismiss
        );
    }

    #[test]
    fn should_only_rebuild_when_task_also_changed() {
        let mut previous = Selection::new();
        previous.ready_by_planner.insert(demo(), true);
        let mut next = previous.clone();
        next.planner_id = Some(demo());
        next.task_id = Some(TaskId::new("t"));

        assert_eq!(
            RebuildDecision::evaluate(&previous, &next),
            RebuildDecision::Rebuild
        );
    }

    #[test]
    fn should_only_rebuild_when_new_planner_not_ready() {
        let previous = Selection::new();
        let mut next = previous.clone();
        next.planner_id = Some(demo());

        assert_eq!(
            RebuildDecision::evaluate(&previous, &next),
            RebuildDecision::Rebuild
        );
    }

    #[test]
    fn should_only_rebuild_on_readiness_identity_change() {
        let previous = ready_selection();
        let mut next = previous.clone();
        // Same contents, new map.
        next.ready_by_planner.insert(demo(), true);

        let changes = Changes::between(&previous, &next);
        assert!(changes.ready && !changes.planner && !changes.applied);
        assert_eq!(
            RebuildDecision::evaluate(&previous, &next),
            RebuildDecision::Rebuild
        );
    }

    #[test]
    fn should_rebuild_without_dismissal_when_disabling() {
        let previous = ready_selection();
        let mut next = previous.clone();
        next.planner_id = None;

        assert_eq!(
            RebuildDecision::evaluate(&previous, &next),
            RebuildDecision::Rebuild
        );
    }
}
