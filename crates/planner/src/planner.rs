//! Planner capability trait.

use async_trait::async_trait;
use im::Vector;
use parley_core::{PlannerId, Seq};
use parley_journal::{AppliedConfig, Fact};
use serde::{Deserialize, Serialize};

use crate::config::{HarnessConfig, HarnessContext};
use crate::error::Result;
use crate::provider::Provider;

/// Everything a planner sees during one pass.
pub struct PlanRequest<'a> {
    /// Facts at the start of the pass.
    pub facts: &'a Vector<Fact>,
    /// Head observed at the start of the pass.
    pub head: Seq,
    pub config: &'a HarnessConfig,
    pub context: &'a HarnessContext,
    pub provider: &'a dyn Provider,
}

/// An action a planner proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedAction {
    /// Draft a message for the counterpart.
    Compose { text: String },
    /// Record an annotation.
    Note { text: String },
}

impl ProposedAction {
    /// The fact recording this action. Drafts get a fresh compose id.
    pub fn into_fact(self) -> Fact {
        match self {
            Self::Compose { text } => Fact::compose_intent(text),
            Self::Note { text } => Fact::note(text),
        }
    }
}

/// A planning capability.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Stable id in the catalog.
    fn id(&self) -> &PlannerId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Propose actions for the current facts.
    ///
    /// # Errors
    ///
    /// Returns an error when the planner or its provider fails.
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<Vec<ProposedAction>>;

    /// Map applied configuration to harness configuration.
    ///
    /// `None` means the planner has no mapping of its own and the catalog
    /// mapping applies.
    fn harness_config(&self, _applied: Option<&AppliedConfig>) -> Option<Result<HarnessConfig>> {
        None
    }
}

/// Planner that never proposes anything. Stands in when planning is off.
#[derive(Debug, Clone)]
pub struct NopPlanner {
    id: PlannerId,
}

impl NopPlanner {
    /// Catalog id of the no-op planner.
    pub const ID: &'static str = "nop";

    /// Create a no-op planner.
    pub fn new() -> Self {
        Self {
            id: PlannerId::from_static(Self::ID),
        }
    }
}

impl Default for NopPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Planner for NopPlanner {
    fn id(&self) -> &PlannerId {
        &self.id
    }

    fn name(&self) -> &str {
        "No-op"
    }

    async fn plan(&self, _request: &PlanRequest<'_>) -> Result<Vec<ProposedAction>> {
        Ok(Vec::new())
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
    use crate::provider::ScriptedProvider;

    #[tokio::test]
    async fn should_never_propose_anything_when_nop() {
        let facts = Vector::unit(Fact::remote_sent("hello"));
        let config = HarnessConfig::new();
        let context = HarnessContext::new("counterpart", "m");
        let provider = ScriptedProvider::new(vec!["reply".to_string()]);
        let request = PlanRequest {
            facts: &facts,
            head: Seq::new(1),
            config: &config,
            context: &context,
            provider: &provider,
        };

        let planner = NopPlanner::new();
        assert!(planner.plan(&request).await.unwrap().is_empty());
        assert!(planner.harness_config(None).is_none());
        assert_eq!(planner.id().as_str(), "nop");
    }

    #[test]
    fn should_turn_compose_into_intent_with_fresh_id() {
        let fact = ProposedAction::Compose {
            text: "hi".to_string(),
        }
        .into_fact();
        assert!(matches!(
            &fact,
            Fact::ComposeIntent { compose_id, text } if !compose_id.is_empty() && text == "hi"
        ));
    }
}
