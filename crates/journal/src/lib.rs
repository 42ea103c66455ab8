//! Shared fact journal and selection state for Parley.
//!
//! This crate provides the state every planner engine reads from and writes
//! to:
//!
//! - **Facts**: immutable, tagged records in an append-only journal
//! - **CAS appends**: a writer supplies the head it observed and the append is
//!   rejected if the head has moved since
//! - **Selection**: which planner is active, its readiness and applied config
//! - **Transitions**: every committed change is published as a
//!   `(previous, next)` snapshot pair, in commit order
//!
//! # Example
//!
//! ```ignore
//! use parley_journal::{AppendOptions, Fact, FactJournal, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionStore::new_arc();
//!     let mut sub = store.subscribe();
//!
//!     let head = store.head().await;
//!     store
//!         .append(vec![Fact::remote_sent("hello")], AppendOptions::cas(head))
//!         .await
//!         .ok();
//!
//!     let transition = sub.recv().await;
//!     println!("{:?}", transition.map(|t| t.next.head()));
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod fact;
pub mod journal;
pub mod selection;
pub mod status;
pub mod store;

pub use error::{JournalError, Result};
pub use fact::Fact;
pub use journal::{AppendOptions, AppendReceipt, FactJournal};
pub use selection::{AppliedConfig, Selection};
pub use status::{PlanPhase, StatusReport, StatusSink};
pub use store::{SessionStore, StoreSnapshot, StoreSubscription, StoreTransition};
