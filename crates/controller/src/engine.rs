//! Engine (re)construction.
//!
//! Resolution never fails: an unknown or unready planner degrades to the
//! no-op planner and a failed config mapping degrades to an empty harness
//! configuration. Only the factory itself can fail.

use std::fmt;
use std::sync::Arc;

use parley_core::ResultExt;
use parley_journal::Selection;
use parley_planner::{
    HarnessBindings, HarnessConfig, HarnessContext, NopPlanner, Planner, PlannerCatalog,
    PlannerHarness, Provider, SchedulingEngine,
};
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::error::Result;

/// Everything needed to build one engine.
#[derive(Clone)]
pub struct EngineSpec {
    pub planner: Arc<dyn Planner>,
    pub config: HarnessConfig,
    pub context: HarnessContext,
    pub bindings: HarnessBindings,
    /// Shared by every engine the controller builds.
    pub provider: Arc<dyn Provider>,
}

impl fmt::Debug for EngineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSpec")
            .field("planner_id", self.planner.id())
            .field("config", &self.config)
            .field("context", &self.context)
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

/// Builds scheduling engines.
pub trait EngineFactory: Send + Sync {
    /// Build an engine from a resolved spec.
    ///
    /// # Errors
    ///
    /// Returns `EngineConstruction` when the engine cannot be built.
    fn build(&self, spec: EngineSpec) -> Result<Arc<dyn SchedulingEngine>>;
}

/// Factory producing [`PlannerHarness`] engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct HarnessFactory;

impl EngineFactory for HarnessFactory {
    fn build(&self, spec: EngineSpec) -> Result<Arc<dyn SchedulingEngine>> {
        Ok(Arc::new(PlannerHarness::new(
            spec.bindings,
            spec.planner,
            spec.config,
            spec.context,
            spec.provider,
        )))
    }
}

/// Resolve the engine spec for a selection.
pub fn resolve_engine_spec(
    selection: &Selection,
    catalog: &PlannerCatalog,
    config: &ControllerConfig,
    bindings: HarnessBindings,
    provider: Arc<dyn Provider>,
) -> EngineSpec {
    let applied = selection.active_applied();

    let (planner, harness_config) = match selection.planner_id.as_ref() {
        Some(planner_id) if selection.is_ready(Some(planner_id)) => {
            match catalog.resolve(planner_id) {
                Ok(planner) => {
                    let mapped = planner
                        .harness_config(applied)
                        .or_else(|| catalog.default_mapping(planner_id).map(|map| map(applied)))
                        .map(|result| {
                            result.or_default_logged(HarnessConfig::new(), "harness config mapping")
                        })
                        .unwrap_or_default();
                    (planner, mapped)
                }
                Err(e) => {
                    warn!(planner_id = %planner_id, error = %e, "Falling back to no-op planner");
                    (nop_planner(), HarnessConfig::new())
                }
            }
        }
        _ => (nop_planner(), HarnessConfig::new()),
    };

    let model = applied
        .and_then(|applied| applied.effective_model())
        .unwrap_or(config.default_model.as_str())
        .to_string();

    debug!(
        planner_id = %planner.id(),
        model = %model,
        settings = harness_config.len(),
        "Resolved engine spec"
    );

    EngineSpec {
        planner,
        config: harness_config,
        context: HarnessContext::new(config.counterpart_id.clone(), model),
        bindings,
        provider,
    }
}

fn nop_planner() -> Arc<dyn Planner> {
    Arc::new(NopPlanner::new())
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
    use async_trait::async_trait;
    use parley_core::PlannerId;
    use parley_journal::{AppliedConfig, SessionStore};
    use parley_planner::{
        PlanRequest, PlannerError, ProposedAction, ScriptedProvider, SimpleDemoPlanner,
    };
    use serde_json::Value;

    /// Planner with its own mapping that always fails.
    struct BrokenMappingPlanner {
        id: PlannerId,
    }

    #[async_trait]
    impl Planner for BrokenMappingPlanner {
        fn id(&self) -> &PlannerId {
            &self.id
        }

        fn name(&self) -> &str {
            "Broken mapping"
        }

        async fn plan(
            &self,
            _request: &PlanRequest<'_>,
        ) -> parley_planner::Result<Vec<ProposedAction>> {
            Ok(Vec::new())
        }

        fn harness_config(
            &self,
            _applied: Option<&AppliedConfig>,
        ) -> Option<parley_planner::Result<HarnessConfig>> {
            Some(Err(PlannerError::config_mapping(self.id.clone(), "nope")))
        }
    }

    fn resolve(selection: &Selection, catalog: &PlannerCatalog) -> EngineSpec {
        resolve_engine_spec(
            selection,
            catalog,
            &ControllerConfig::default(),
            HarnessBindings::from_store(SessionStore::new_arc()),
            Arc::new(ScriptedProvider::new(Vec::new())),
        )
    }

    fn demo() -> PlannerId {
        PlannerId::from_static(SimpleDemoPlanner::ID)
    }

    #[test]
    fn should_use_nop_planner_when_disabled() {
        let spec = resolve(&Selection::new(), &PlannerCatalog::builtin());
        assert_eq!(spec.planner.id().as_str(), NopPlanner::ID);
        assert_eq!(spec.context.model, "chitchat-small");
        assert_eq!(spec.context.counterpart_id, "counterpart");
    }

    #[test]
    fn should_use_nop_planner_when_not_ready() {
        let mut selection = Selection::new();
        selection.planner_id = Some(demo());
        let spec = resolve(&selection, &PlannerCatalog::builtin());
        assert_eq!(spec.planner.id().as_str(), NopPlanner::ID);
    }

    #[test]
    fn should_resolve_ready_planner_with_catalog_mapping() {
        let mut selection = Selection::new();
        selection.planner_id = Some(demo());
        selection.ready_by_planner.insert(demo(), true);
        selection.applied_by_planner.insert(
            demo(),
            AppliedConfig::with_model("  big-model ").setting("max_turns", Value::from(4)),
        );

        let spec = resolve(&selection, &PlannerCatalog::builtin());
        assert_eq!(spec.planner.id(), &demo());
        assert_eq!(spec.context.model, "big-model");
        assert_eq!(spec.config.get("max_turns"), Some(&Value::from(4_u64)));
    }

    #[test]
    fn should_degrade_failed_catalog_mapping_to_empty() {
        let mut selection = Selection::new();
        selection.planner_id = Some(demo());
        selection.ready_by_planner.insert(demo(), true);
        selection.applied_by_planner.insert(
            demo(),
            AppliedConfig::default().setting("temperature", Value::from("hot")),
        );

        let spec = resolve(&selection, &PlannerCatalog::builtin());
        assert_eq!(spec.planner.id(), &demo());
        assert!(spec.config.is_empty());
    }

    #[test]
    fn should_prefer_planner_mapping_and_degrade_its_failure() {
        let id = PlannerId::from_static("broken");
        let catalog = PlannerCatalog::new().with_planner(
            Arc::new(BrokenMappingPlanner { id: id.clone() }),
            Some(SimpleDemoPlanner::map_config),
        );
        let mut selection = Selection::new();
        selection.planner_id = Some(id.clone());
        selection.ready_by_planner.insert(id.clone(), true);
        selection.applied_by_planner.insert(
            id,
            AppliedConfig::default().setting("max_turns", Value::from(2)),
        );

        let spec = resolve(&selection, &catalog);
        assert!(spec.config.is_empty());
    }

    #[test]
    fn should_fall_back_to_nop_for_unknown_ready_planner() {
        let ghost = PlannerId::from_static("ghost");
        let mut selection = Selection::new();
        selection.planner_id = Some(ghost.clone());
        selection.ready_by_planner.insert(ghost, true);

        let spec = resolve(&selection, &PlannerCatalog::builtin());
        assert_eq!(spec.planner.id().as_str(), NopPlanner::ID);
    }

    #[test]
    fn should_build_harness_from_spec() {
        let spec = resolve(&Selection::new(), &PlannerCatalog::builtin());
        let engine = HarnessFactory.build(spec).unwrap();
        assert_eq!(engine.planner_id().as_str(), NopPlanner::ID);
    }
}
