//! Planner selection state.
//!
//! The maps are persistent (`im`) collections. Every mutation through the
//! store produces a new map, so "did this map change" is answered by pointer
//! identity rather than by deep comparison.

use im::HashMap;
use parley_core::{PlannerId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration the user applied to a planner.
///
/// Opaque to everything but the planner itself, apart from `model`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedConfig {
    /// Requested model identifier.
    #[serde(default)]
    pub model: Option<String>,

    /// Planner-specific settings.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl AppliedConfig {
    /// Create an applied config with only a model.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            settings: Map::new(),
        }
    }

    /// Add a setting.
    #[must_use]
    pub fn setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// The model, trimmed, if it is not blank.
    pub fn effective_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
    }
}

/// Which planner is active and how it is configured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Active planner, `None` when planning is disabled.
    pub planner_id: Option<PlannerId>,
    /// Current task context.
    pub task_id: Option<TaskId>,
    /// Readiness per planner.
    pub ready_by_planner: HashMap<PlannerId, bool>,
    /// Applied configuration per planner.
    pub applied_by_planner: HashMap<PlannerId, AppliedConfig>,
}

impl Selection {
    /// Create an empty selection with planning disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a planner is marked ready. The disabled selection never is.
    pub fn is_ready(&self, planner_id: Option<&PlannerId>) -> bool {
        planner_id
            .and_then(|id| self.ready_by_planner.get(id))
            .copied()
            .unwrap_or(false)
    }

    /// Whether the active planner is marked ready.
    pub fn active_ready(&self) -> bool {
        self.is_ready(self.planner_id.as_ref())
    }

    /// Applied configuration for the active planner.
    pub fn active_applied(&self) -> Option<&AppliedConfig> {
        self.planner_id
            .as_ref()
            .and_then(|id| self.applied_by_planner.get(id))
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
    fn should_never_report_disabled_selection_ready() {
        let selection = Selection::new();
        assert!(!selection.active_ready());
    }

    #[test]
    fn should_report_active_planner_readiness() {
        let id = PlannerId::from_static("simple-demo");
        let mut selection = Selection::new();
        selection.planner_id = Some(id.clone());
        assert!(!selection.active_ready());

        selection.ready_by_planner.insert(id, true);
        assert!(selection.active_ready());
    }

    #[test]
    fn should_trim_effective_model() {
        assert_eq!(
            AppliedConfig::with_model("  gpt-x ").effective_model(),
            Some("gpt-x")
        );
        assert_eq!(AppliedConfig::with_model("   ").effective_model(), None);
        assert_eq!(AppliedConfig::default().effective_model(), None);
    }

    #[test]
    fn should_flatten_settings_next_to_model() {
        let applied: AppliedConfig =
            serde_json::from_str(r#"{"model":"m","temperature":0.2}"#).unwrap();
        assert_eq!(applied.model.as_deref(), Some("m"));
        assert_eq!(applied.settings.get("temperature"), Some(&Value::from(0.2)));
    }

    #[test]
    fn should_change_map_identity_on_insert_into_shared_copy() {
        let id = PlannerId::from_static("a");
        let before: HashMap<PlannerId, bool> = HashMap::new();
        let mut after = before.clone();
        assert!(before.ptr_eq(&after));

        after.insert(id, true);
        assert!(!before.ptr_eq(&after));
    }
}
