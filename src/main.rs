//! # Parley
//!
//! Command-line entry point.
//!
//! ## Commands
//!
//! - `simulate` wires a session store, the built-in planner catalog, a
//!   scripted provider and the reconciliation controller, replays a session
//!   script and prints the resulting journal as JSON lines
//! - `config` prints the effective configuration
//! - `planners` lists the built-in planners
//!
//! Logging goes through `tracing`; set `RUST_LOG` to adjust (default `info`).

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;
mod script;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    commands::execute_command(cli.command).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
