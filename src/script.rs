//! Scripted sessions.
//!
//! A script is an ordered list of `[[step]]` tables, each tagged by `kind`:
//!
//! ```toml
//! [[step]]
//! kind = "ready"
//! planner = "simple-demo"
//!
//! [[step]]
//! kind = "select"
//! planner = "simple-demo"
//!
//! [[step]]
//! kind = "remote"
//! text = "hi there"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use parley_core::{PlannerId, TaskId};
use parley_journal::{AppendOptions, AppliedConfig, Fact, FactJournal, SessionStore};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// One scripted action against the session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// The counterpart sends a message.
    Remote { text: String },
    /// Switch planner; omit `planner` to disable planning.
    Select { planner: Option<String> },
    /// Mark a planner ready or not.
    Ready {
        planner: String,
        #[serde(default = "default_ready")]
        ready: bool,
    },
    /// Apply configuration to a planner.
    Apply {
        planner: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        settings: Map<String, Value>,
    },
    /// Switch task; omit `id` to clear it.
    Task { id: Option<String> },
    /// Pause.
    Wait { ms: u64 },
}

const fn default_ready() -> bool {
    true
}

/// A parsed session script.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionScript {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl SessionScript {
    /// Parse a script from TOML.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse session script")
    }

    /// Load a script file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session script {}", path.display()))?;
        Self::parse(&content)
    }

    /// Apply every step to `store`, pausing `settle` after each one.
    pub async fn run(&self, store: &SessionStore, settle: Duration) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, step = ?step, "Running script step");
            apply_step(store, step)
                .await
                .with_context(|| format!("Script step {} failed", index.saturating_add(1)))?;
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }
}

async fn apply_step(store: &SessionStore, step: &Step) -> Result<()> {
    match step {
        Step::Remote { text } => {
            store
                .append(
                    vec![Fact::remote_sent(text.clone())],
                    AppendOptions::unconditional(),
                )
                .await?;
        }
        Step::Select { planner } => {
            let planner_id = planner.as_deref().map(PlannerId::new).transpose()?;
            store.select_planner(planner_id).await;
        }
        Step::Ready { planner, ready } => {
            store.set_ready(PlannerId::new(planner.as_str())?, *ready).await;
        }
        Step::Apply {
            planner,
            model,
            settings,
        } => {
            let applied = AppliedConfig {
                model: model.clone(),
                settings: settings.clone(),
            };
            store
                .apply_config(PlannerId::new(planner.as_str())?, applied)
                .await;
        }
        Step::Task { id } => {
            store.set_task(id.as_deref().map(TaskId::new)).await;
        }
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
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

    const SCRIPT: &str = r#"
[[step]]
kind = "ready"
planner = "simple-demo"

[[step]]
kind = "select"
planner = "simple-demo"

[[step]]
kind = "apply"
planner = "simple-demo"
model = "big"
settings = { max_turns = 2 }

[[step]]
kind = "task"
id = "t-1"

[[step]]
kind = "remote"
text = "hello"
"#;

    #[test]
    fn test_parse_script() {
        let script = SessionScript::parse(SCRIPT).unwrap();
        assert_eq!(script.steps.len(), 5);
        assert_eq!(
            script.steps[0],
            Step::Ready {
                planner: "simple-demo".to_string(),
                ready: true
            }
        );
        assert!(matches!(&script.steps[2], Step::Apply { settings, .. } if settings.len() == 1));
    }

    #[test]
    fn test_rejects_unknown_step() {
        assert!(SessionScript::parse("[[step]]\nkind = \"dance\"").is_err());
    }

    #[tokio::test]
    async fn test_run_script_updates_store() {
        let store = SessionStore::new();
        let script = SessionScript::parse(SCRIPT).unwrap();

        script.run(&store, Duration::ZERO).await.unwrap();

        let selection = store.selection().await;
        assert!(selection.active_ready());
        assert_eq!(
            selection.active_applied().and_then(AppliedConfig::effective_model),
            Some("big")
        );
        assert_eq!(selection.task_id, Some(TaskId::new("t-1")));
        assert_eq!(store.facts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_planner_id_fails_step() {
        let store = SessionStore::new();
        let script = SessionScript::parse("[[step]]\nkind = \"ready\"\nplanner = \" \"").unwrap();
        assert!(script.run(&store, Duration::ZERO).await.is_err());
    }
}
