//! Demo planner: answers the counterpart once per message.

use std::collections::HashSet;

use async_trait::async_trait;
use parley_core::{ComposeId, PlannerId};
use parley_journal::{AppliedConfig, Fact};
use serde_json::Value;

use crate::config::HarnessConfig;
use crate::error::{PlannerError, Result};
use crate::planner::{PlanRequest, Planner, ProposedAction};
use crate::provider::CompletionRequest;

const OPENING_PROMPT: &str = "Open the conversation.";
const TURN_LIMIT_NOTE: &str = "turn limit reached";

/// Planner that drafts one reply to the latest remote message.
///
/// Scanning newest to oldest, an open draft means the planner is waiting on
/// the user and proposes nothing. Reaching a remote message (or the start of
/// the journal) asks the provider for a reply.
#[derive(Debug, Clone)]
pub struct SimpleDemoPlanner {
    id: PlannerId,
}

impl SimpleDemoPlanner {
    /// Catalog id.
    pub const ID: &'static str = "simple-demo";

    /// Create the planner.
    pub fn new() -> Self {
        Self {
            id: PlannerId::from_static(Self::ID),
        }
    }

    /// Catalog mapping: keeps `temperature` (0.0 to 2.0) and `max_turns`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMapping` when a known setting has the wrong shape.
    pub fn map_config(applied: Option<&AppliedConfig>) -> Result<HarnessConfig> {
        let id = PlannerId::from_static(Self::ID);
        let Some(applied) = applied else {
            return Ok(HarnessConfig::new());
        };

        let mut config = HarnessConfig::new();
        if let Some(value) = applied.settings.get("temperature") {
            let temperature = value
                .as_f64()
                .filter(|t| (0.0..=2.0).contains(t))
                .ok_or_else(|| {
                    PlannerError::config_mapping(
                        id.clone(),
                        format!("temperature must be a number in 0..=2, got {value}"),
                    )
                })?;
            config = config.with("temperature", Value::from(temperature));
        }
        if let Some(value) = applied.settings.get("max_turns") {
            let max_turns = value.as_u64().ok_or_else(|| {
                PlannerError::config_mapping(
                    id.clone(),
                    format!("max_turns must be a non-negative integer, got {value}"),
                )
            })?;
            config = config.with("max_turns", Value::from(max_turns));
        }
        Ok(config)
    }

    fn turns_taken(facts: &im::Vector<Fact>) -> u64 {
        let count = facts
            .iter()
            .filter(|fact| matches!(fact, Fact::ComposeIntent { .. }))
            .count();
        u64::try_from(count).unwrap_or(u64::MAX)
    }
}

impl Default for SimpleDemoPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Planner for SimpleDemoPlanner {
    fn id(&self) -> &PlannerId {
        &self.id
    }

    fn name(&self) -> &str {
        "Simple demo"
    }

    async fn plan(&self, request: &PlanRequest<'_>) -> Result<Vec<ProposedAction>> {
        let dismissed: HashSet<&ComposeId> = request
            .facts
            .iter()
            .filter_map(|fact| match fact {
                Fact::ComposeDismissed { compose_id } => Some(compose_id),
                _ => None,
            })
            .collect();

        let mut prompt = None;
        for fact in request.facts.iter().rev() {
            match fact {
                Fact::ComposeIntent { compose_id, .. }
                    if !compose_id.is_empty() && !dismissed.contains(compose_id) =>
                {
                    return Ok(Vec::new());
                }
                Fact::RemoteSent { text } => {
                    prompt = Some(text.clone());
                    break;
                }
                _ => {}
            }
        }

        let max_turns = request.config.get("max_turns").and_then(Value::as_u64);
        if max_turns.is_some_and(|max| Self::turns_taken(request.facts) >= max) {
            let already_noted = request
                .facts
                .iter()
                .any(|fact| matches!(fact, Fact::Note { text } if text == TURN_LIMIT_NOTE));
            if already_noted {
                return Ok(Vec::new());
            }
            return Ok(vec![ProposedAction::Note {
                text: TURN_LIMIT_NOTE.to_string(),
            }]);
        }

        let reply = request
            .provider
            .complete(CompletionRequest {
                model: request.context.model.clone(),
                counterpart_id: request.context.counterpart_id.clone(),
                prompt: prompt.unwrap_or_else(|| OPENING_PROMPT.to_string()),
                temperature: request.config.get("temperature").and_then(Value::as_f64),
            })
            .await?;

        let text = reply.trim();
        if text.is_empty() {
            return Err(PlannerError::plan_failed(
                self.id.clone(),
                "provider returned an empty reply",
            ));
        }
        Ok(vec![ProposedAction::Compose {
            text: text.to_string(),
        }])
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
    use crate::config::HarnessContext;
    use crate::provider::ScriptedProvider;
    use im::Vector;
    use parley_core::Seq;

    async fn plan_with(facts: Vector<Fact>, config: HarnessConfig) -> Vec<ProposedAction> {
        let context = HarnessContext::new("counterpart", "m");
        let provider = ScriptedProvider::new(vec!["sure thing".to_string()]);
        let request = PlanRequest {
            facts: &facts,
            head: Seq::from_len(facts.len()),
            config: &config,
            context: &context,
            provider: &provider,
        };
        SimpleDemoPlanner::new().plan(&request).await.unwrap()
    }

    #[tokio::test]
    async fn should_reply_to_latest_remote_message() {
        let facts = Vector::unit(Fact::remote_sent("how are you?"));
        let actions = plan_with(facts, HarnessConfig::new()).await;
        assert_eq!(
            actions,
            vec![ProposedAction::Compose {
                text: "sure thing".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn should_fail_on_blank_reply() {
        let facts = Vector::unit(Fact::remote_sent("hello?"));
        let config = HarnessConfig::new();
        let context = HarnessContext::new("counterpart", "m");
        let provider = ScriptedProvider::new(vec!["   ".to_string()]);
        let request = PlanRequest {
            facts: &facts,
            head: Seq::from_len(facts.len()),
            config: &config,
            context: &context,
            provider: &provider,
        };

        let err = SimpleDemoPlanner::new().plan(&request).await.unwrap_err();
        assert!(matches!(err, PlannerError::PlanFailed { .. }));
    }

    #[tokio::test]
    async fn should_wait_while_a_draft_is_open() {
        let mut facts = Vector::unit(Fact::remote_sent("hi"));
        facts.push_back(Fact::compose_intent("hello"));
        assert!(plan_with(facts, HarnessConfig::new()).await.is_empty());
    }

    #[tokio::test]
    async fn should_replan_after_draft_dismissed() {
        let id = ComposeId::new("a");
        let facts: Vector<Fact> = vec![
            Fact::ComposeIntent {
                compose_id: id.clone(),
                text: "old".to_string(),
            },
            Fact::compose_dismissed(id),
        ]
        .into();
        assert_eq!(plan_with(facts, HarnessConfig::new()).await.len(), 1);
    }

    #[tokio::test]
    async fn should_note_turn_limit_once() {
        let config = HarnessConfig::new().with("max_turns", Value::from(1_u64));
        let id = ComposeId::new("a");
        let mut facts: Vector<Fact> = vec![
            Fact::ComposeIntent {
                compose_id: id.clone(),
                text: "one".to_string(),
            },
            Fact::remote_sent("again"),
        ]
        .into();

        let actions = plan_with(facts.clone(), config.clone()).await;
        assert!(matches!(actions.as_slice(), [ProposedAction::Note { .. }]));

        facts.push_back(Fact::note(TURN_LIMIT_NOTE));
        assert!(plan_with(facts, config).await.is_empty());
    }

    #[test]
    fn should_map_known_settings() {
        let applied = AppliedConfig::with_model("m")
            .setting("temperature", Value::from(0.5))
            .setting("max_turns", Value::from(3))
            .setting("ignored", Value::from("x"));
        let config = SimpleDemoPlanner::map_config(Some(&applied)).unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("max_turns"), Some(&Value::from(3_u64)));
    }

    #[test]
    fn should_reject_out_of_range_temperature() {
        let applied = AppliedConfig::default().setting("temperature", Value::from(9.0));
        let err = SimpleDemoPlanner::map_config(Some(&applied)).unwrap_err();
        assert!(matches!(err, PlannerError::ConfigMapping { .. }));
    }

    #[test]
    fn should_map_missing_config_to_empty() {
        assert!(SimpleDemoPlanner::map_config(None).unwrap().is_empty());
    }
}
