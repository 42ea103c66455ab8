//! Planner capabilities and the planning harness.
//!
//! - **Planner**: a polymorphic capability that turns the current facts into
//!   proposed actions
//! - **Catalog**: planners by id, with optional default config mappings
//! - **Provider**: the upstream completion service, shared by every engine
//! - **Harness**: the scheduling engine that runs planning passes on request,
//!   coalescing overlapping requests

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod harness;
pub mod planner;
pub mod planners;
pub mod provider;

pub use catalog::PlannerCatalog;
pub use config::{ConfigMapper, HarnessConfig, HarnessContext};
pub use error::{PlannerError, Result};
pub use harness::{HarnessBindings, PassOutcome, PlannerHarness, SchedulingEngine};
pub use planner::{NopPlanner, PlanRequest, Planner, ProposedAction};
pub use planners::SimpleDemoPlanner;
pub use provider::{CompletionRequest, Provider, ProviderConfig, ScriptedProvider};
