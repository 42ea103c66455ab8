//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley - keeps an autonomous planner in step with a shared fact journal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Keeps an autonomous planner in step with a shared fact journal")]
#[command(
    long_about = "Parley runs a reconciliation controller over an in-memory session: it rebuilds the planning engine when the selection changes, withdraws stale drafts with conditional appends, and requests planning passes as the journal grows."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted session and print the resulting journal
    Simulate {
        /// Session script (TOML)
        #[arg(short, long)]
        script: PathBuf,

        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Milliseconds to let planning passes run after each step
        #[arg(long, default_value_t = 50)]
        settle_ms: u64,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the built-in planners
    Planners,
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
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["parley", "simulate", "--script", "demo.toml"]);
        assert!(matches!(
            cli.map(|cli| cli.command),
            Ok(Commands::Simulate { script, config: None, settle_ms: 50 })
                if script == PathBuf::from("demo.toml")
        ));
    }

    #[test]
    fn test_parse_planners() {
        let cli = Cli::try_parse_from(["parley", "planners"]);
        assert!(matches!(cli.map(|cli| cli.command), Ok(Commands::Planners)));
    }
}
