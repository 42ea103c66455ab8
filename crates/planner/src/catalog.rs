//! Catalog of available planners.

use std::collections::BTreeMap;
use std::sync::Arc;

use parley_core::PlannerId;

use crate::config::ConfigMapper;
use crate::error::{PlannerError, Result};
use crate::planner::Planner;
use crate::planners::SimpleDemoPlanner;

struct CatalogEntry {
    planner: Arc<dyn Planner>,
    mapper: Option<ConfigMapper>,
}

/// Planners by id, each with an optional default config mapping.
#[derive(Default)]
pub struct PlannerCatalog {
    entries: BTreeMap<PlannerId, CatalogEntry>,
}

impl PlannerCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in planners.
    pub fn builtin() -> Self {
        Self::new().with_planner(
            Arc::new(SimpleDemoPlanner::new()),
            Some(SimpleDemoPlanner::map_config),
        )
    }

    /// Register a planner, replacing any planner with the same id.
    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn Planner>, mapper: Option<ConfigMapper>) -> Self {
        self.register(planner, mapper);
        self
    }

    /// Register a planner, replacing any planner with the same id.
    pub fn register(&mut self, planner: Arc<dyn Planner>, mapper: Option<ConfigMapper>) {
        let id = planner.id().clone();
        tracing::debug!(planner_id = %id, has_mapper = mapper.is_some(), "Registering planner");
        self.entries.insert(id, CatalogEntry { planner, mapper });
    }

    /// Look up a planner.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlanner` when the id is not registered.
    pub fn resolve(&self, planner_id: &PlannerId) -> Result<Arc<dyn Planner>> {
        self.entries
            .get(planner_id)
            .map(|entry| Arc::clone(&entry.planner))
            .ok_or_else(|| PlannerError::unknown_planner(planner_id.clone()))
    }

    /// Default config mapping registered for a planner.
    pub fn default_mapping(&self, planner_id: &PlannerId) -> Option<ConfigMapper> {
        self.entries.get(planner_id).and_then(|entry| entry.mapper)
    }

    /// Registered planners as `(id, name)`, ordered by id.
    pub fn describe(&self) -> Vec<(PlannerId, String)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.planner.name().to_string()))
            .collect()
    }

    /// Number of registered planners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
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
    use crate::planner::NopPlanner;

    #[test]
    fn should_resolve_builtin_planner() {
        let catalog = PlannerCatalog::builtin();
        let id = PlannerId::from_static(SimpleDemoPlanner::ID);

        let planner = catalog.resolve(&id).unwrap();
        assert_eq!(planner.id(), &id);
        assert!(catalog.default_mapping(&id).is_some());
    }

    #[test]
    fn should_fail_for_unknown_planner() {
        let catalog = PlannerCatalog::builtin();
        let err = catalog
            .resolve(&PlannerId::from_static("ghost"))
            .err()
            .unwrap();
        assert!(matches!(err, PlannerError::UnknownPlanner { .. }));
    }

    #[test]
    fn should_register_planner_without_mapping() {
        let catalog = PlannerCatalog::new().with_planner(Arc::new(NopPlanner::new()), None);
        let id = PlannerId::from_static(NopPlanner::ID);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.default_mapping(&id).is_none());
        assert_eq!(catalog.describe(), vec![(id, "No-op".to_string())]);
    }
}
