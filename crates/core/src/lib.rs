//! Core identifiers, errors, and utilities shared by the Parley crates.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod ids;
pub mod result;

pub use error::Error;
pub use ids::{ComposeId, EngineId, PlannerId, Seq, TaskId};
pub use result::{Result, ResultExt};
