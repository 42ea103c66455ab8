//! Fact journal trait.

use async_trait::async_trait;
use im::Vector;
use parley_core::Seq;

use crate::error::Result;
use crate::fact::Fact;

/// Options for a journal append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Head the writer observed. When set, the append only applies if the
    /// journal is still at this head.
    pub cas_base_seq: Option<Seq>,
}

impl AppendOptions {
    /// Unconditional append.
    pub const fn unconditional() -> Self {
        Self { cas_base_seq: None }
    }

    /// Conditional append against an observed head.
    pub const fn cas(base: Seq) -> Self {
        Self {
            cas_base_seq: Some(base),
        }
    }
}

/// Result of an applied append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Head before the batch was applied.
    pub base: Seq,
    /// Head after the batch was applied.
    pub head: Seq,
    /// Number of facts appended.
    pub appended: usize,
}

/// Append-only, totally ordered fact journal.
///
/// Reads always reflect the journal at call time; callers holding an
/// `Arc<dyn FactJournal>` never see a stale copy.
#[async_trait]
pub trait FactJournal: Send + Sync {
    /// Current facts, oldest first.
    async fn facts(&self) -> Vector<Fact>;

    /// Current head.
    async fn head(&self) -> Seq;

    /// Append a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns `JournalError::CasConflict` when `options.cas_base_seq` is set
    /// and differs from the head at apply time. Nothing is applied then.
    async fn append(&self, batch: Vec<Fact>, options: AppendOptions) -> Result<AppendReceipt>;
}
