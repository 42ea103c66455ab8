//! CLI command handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parley_controller::{
    ControllerObserver, FanoutObserver, MetricsObserver, ParleyConfig, ReconciliationController,
    TracingObserver,
};
use parley_journal::{FactJournal, SessionStore};
use parley_planner::{PlannerCatalog, ScriptedProvider};
use tracing::info;

use crate::cli::Commands;
use crate::script::SessionScript;

/// Execute a CLI command.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Simulate {
            script,
            config,
            settle_ms,
        } => cmd_simulate(&script, config.as_deref(), settle_ms).await,
        Commands::Config { config } => cmd_config(config.as_deref()),
        Commands::Planners => cmd_planners(),
    }
}

/// Load configuration from `path` (or defaults) with environment overrides.
fn load_config(path: Option<&Path>) -> Result<ParleyConfig> {
    let config = match path {
        Some(path) => ParleyConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?
            .with_env_overrides(),
        None => ParleyConfig::from_env(),
    };
    config.controller.validate()?;
    Ok(config)
}

/// Run a scripted session under the controller and print the journal.
async fn cmd_simulate(script_path: &Path, config_path: Option<&Path>, settle_ms: u64) -> Result<()> {
    let config = load_config(config_path)?;
    let script = SessionScript::from_file(script_path)?;
    let settle = Duration::from_millis(settle_ms);

    let store = Arc::new(SessionStore::with_capacity(
        config.controller.channel_capacity,
    ));
    let metrics = Arc::new(MetricsObserver::new());
    let observer = FanoutObserver::new()
        .with(Arc::new(TracingObserver))
        .with(Arc::clone(&metrics) as Arc<dyn ControllerObserver>);

    let controller = ReconciliationController::builder(
        Arc::clone(&store),
        Arc::new(PlannerCatalog::builtin()),
        Arc::new(ScriptedProvider::from_config(&config.provider)),
    )
    .observer(Arc::new(observer))
    .config(config.controller.clone())
    .build();

    controller.initialize().await?;
    info!(steps = script.steps.len(), "Running session script");
    script.run(&store, settle).await?;
    tokio::time::sleep(settle).await;
    controller.shutdown().await?;

    for fact in store.facts().await.iter() {
        println!("{}", serde_json::to_string(fact)?);
    }
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}

/// Print the effective configuration.
fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

/// List the built-in planners.
fn cmd_planners() -> Result<()> {
    for (id, name) in PlannerCatalog::builtin().describe() {
        println!("{id}\t{name}");
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
    use std::io::Write;

    #[test]
    fn test_load_default_config() {
        let config = load_config(None).unwrap();
        assert!(config.controller.validate().is_ok());
    }

    #[tokio::test]
    async fn test_simulate_runs_script() {
        let mut script = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(script, "[[step]]\nkind = \"remote\"\ntext = \"hi\"").unwrap();

        let result = cmd_simulate(script.path(), None, 0).await;
        assert!(result.is_ok());
    }
}
