//! Reconciliation controller for Parley.
//!
//! Keeps the active planning engine in step with the session store:
//!
//! - **Rebuild decision**: a selection transition that changes the planner,
//!   task, readiness or applied configuration replaces the engine
//! - **Dismissal**: switching to a ready planner within the same task first
//!   withdraws the latest unsent draft with a CAS append
//! - **Scheduling decision**: every head change requests one pass on the
//!   current engine
//! - **Lifecycle**: explicit `initialize()` / `shutdown()`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley_controller::ReconciliationController;
//! use parley_journal::SessionStore;
//! use parley_planner::{PlannerCatalog, ScriptedProvider};
//!
//! #[tokio::main]
//! async fn main() -> parley_controller::Result<()> {
//!     let store = SessionStore::new_arc();
//!     let controller = ReconciliationController::new(
//!         Arc::clone(&store),
//!         Arc::new(PlannerCatalog::builtin()),
//!         Arc::new(ScriptedProvider::new(vec!["hi".into()])),
//!     );
//!     controller.initialize().await?;
//!     controller.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod controller;
pub mod decision;
pub mod dismissal;
pub mod engine;
pub mod error;
pub mod observer;

pub use config::{ControllerConfig, ParleyConfig};
pub use controller::{ControllerBuilder, ReconciliationController, TransitionReport};
pub use decision::{Changes, RebuildDecision};
pub use dismissal::{dismiss_latest_unsent_draft, DismissOutcome};
pub use engine::{resolve_engine_spec, EngineFactory, EngineSpec, HarnessFactory};
pub use error::{ControllerError, Result};
pub use observer::{
    ControllerEvent, ControllerMetrics, ControllerObserver, FanoutObserver, MetricsObserver,
    PassReason, TracingObserver,
};
