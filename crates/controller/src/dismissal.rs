//! Withdrawal of the latest unsent draft.

use std::collections::HashSet;

use im::Vector;
use parley_core::{ComposeId, Seq};
use parley_journal::{AppendOptions, Fact, FactJournal, JournalError};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ControllerError, Result};

/// Result of one dismissal reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DismissOutcome {
    /// The journal had no facts.
    EmptyJournal,
    /// A remote send was reached before any open draft.
    HorizonReached,
    /// No open draft was found.
    NothingToDismiss,
    /// The draft was withdrawn.
    Dismissed { compose_id: ComposeId, head: Seq },
    /// The journal moved after it was read; nothing was appended.
    Conflict {
        compose_id: ComposeId,
        expected: Seq,
        actual: Seq,
    },
}

impl DismissOutcome {
    /// The draft targeted by this reconciliation, if any.
    pub fn target(&self) -> Option<&ComposeId> {
        match self {
            Self::Dismissed { compose_id, .. } | Self::Conflict { compose_id, .. } => {
                Some(compose_id)
            }
            _ => None,
        }
    }
}

/// Find the draft to withdraw: the newest `ComposeIntent` after the last
/// `RemoteSent` that has a non-empty id and no matching `ComposeDismissed`.
///
/// Returns `Err(outcome)` when there is nothing to withdraw.
fn find_target(facts: &Vector<Fact>) -> std::result::Result<&ComposeId, DismissOutcome> {
    let dismissed: HashSet<&ComposeId> = facts
        .iter()
        .filter_map(|fact| match fact {
            Fact::ComposeDismissed { compose_id } => Some(compose_id),
            _ => None,
        })
        .collect();

    for fact in facts.iter().rev() {
        match fact {
            Fact::RemoteSent { .. } => return Err(DismissOutcome::HorizonReached),
            Fact::ComposeIntent { compose_id, .. }
                if !compose_id.is_empty() && !dismissed.contains(compose_id) =>
            {
                return Ok(compose_id);
            }
            _ => {}
        }
    }
    Err(DismissOutcome::NothingToDismiss)
}

/// Withdraw the newest unsent draft with a single CAS append.
///
/// The append is conditioned on the head read before the facts. At most one
/// append is attempted and a CAS conflict is never retried.
///
/// # Errors
///
/// Returns `Dismissal` when the append fails for any reason other than a CAS
/// conflict.
pub async fn dismiss_latest_unsent_draft(journal: &dyn FactJournal) -> Result<DismissOutcome> {
    let head = journal.head().await;
    let facts = journal.facts().await;
    if facts.is_empty() {
        return Ok(DismissOutcome::EmptyJournal);
    }

    let compose_id = match find_target(&facts) {
        Ok(compose_id) => compose_id.clone(),
        Err(outcome) => {
            debug!(outcome = ?outcome, seq = head.value(), "No draft to dismiss");
            return Ok(outcome);
        }
    };

    match journal
        .append(
            vec![Fact::compose_dismissed(compose_id.clone())],
            AppendOptions::cas(head),
        )
        .await
    {
        Ok(receipt) => {
            info!(compose_id = %compose_id, seq = receipt.head.value(), "Dismissed draft");
            Ok(DismissOutcome::Dismissed {
                compose_id,
                head: receipt.head,
            })
        }
        Err(JournalError::CasConflict { expected, actual }) => {
            debug!(
                compose_id = %compose_id,
                expected = expected.value(),
                actual = actual.value(),
                "Dismissal lost the race"
            );
            Ok(DismissOutcome::Conflict {
                compose_id,
                expected,
                actual,
            })
        }
        Err(e) => Err(ControllerError::dismissal(e.to_string())),
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
    use async_trait::async_trait;
    use parley_journal::{AppendReceipt, SessionStore};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Journal where another writer appends right after the head is read.
    struct RacingJournal {
        store: SessionStore,
        raced: AtomicBool,
        appends: AtomicUsize,
    }

    #[async_trait]
    impl FactJournal for RacingJournal {
        async fn facts(&self) -> Vector<Fact> {
            self.store.facts().await
        }

        async fn head(&self) -> Seq {
            let head = self.store.head().await;
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.store
                    .append(vec![Fact::note("concurrent")], AppendOptions::unconditional())
                    .await
                    .unwrap();
            }
            head
        }

        async fn append(
            &self,
            batch: Vec<Fact>,
            options: AppendOptions,
        ) -> parley_journal::Result<AppendReceipt> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            self.store.append(batch, options).await
        }
    }

    fn intent(id: &str) -> Fact {
        Fact::ComposeIntent {
            compose_id: ComposeId::new(id),
            text: format!("draft {id}"),
        }
    }

    async fn store_with(facts: Vec<Fact>) -> SessionStore {
        let store = SessionStore::new();
        store
            .append(facts, AppendOptions::unconditional())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn should_report_empty_journal() {
        let store = SessionStore::new();
        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();
        assert_eq!(outcome, DismissOutcome::EmptyJournal);
    }

    #[tokio::test]
    async fn should_dismiss_newest_open_draft() {
        let store = store_with(vec![intent("a"), Fact::note("n"), intent("b")]).await;

        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();

        assert_eq!(
            outcome,
            DismissOutcome::Dismissed {
                compose_id: ComposeId::new("b"),
                head: Seq::new(4),
            }
        );
        let facts = store.facts().await;
        assert_eq!(
            facts.back(),
            Some(&Fact::compose_dismissed(ComposeId::new("b")))
        );
    }

    #[tokio::test]
    async fn should_skip_already_dismissed_draft() {
        let store = store_with(vec![
            intent("a"),
            intent("b"),
            Fact::compose_dismissed(ComposeId::new("b")),
        ])
        .await;

        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();
        assert_eq!(outcome.target(), Some(&ComposeId::new("a")));
    }

    #[tokio::test]
    async fn should_skip_drafts_with_empty_id() {
        let store = store_with(vec![intent("a"), intent("")]).await;

        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();
        assert_eq!(outcome.target(), Some(&ComposeId::new("a")));
    }

    #[tokio::test]
    async fn should_dismiss_draft_with_whitespace_id() {
        let store = store_with(vec![intent(" ")]).await;

        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();

        assert_eq!(
            outcome,
            DismissOutcome::Dismissed {
                compose_id: ComposeId::new(" "),
                head: Seq::new(2),
            }
        );
    }

    #[tokio::test]
    async fn should_stop_at_remote_send() {
        let store = store_with(vec![intent("a"), Fact::remote_sent("hi")]).await;

        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();

        assert_eq!(outcome, DismissOutcome::HorizonReached);
        assert_eq!(store.head().await, Seq::new(2));
    }

    #[tokio::test]
    async fn should_report_nothing_when_every_draft_is_dismissed() {
        let store = store_with(vec![
            intent("a"),
            Fact::compose_dismissed(ComposeId::new("a")),
        ])
        .await;

        let outcome = dismiss_latest_unsent_draft(&store).await.unwrap();
        assert_eq!(outcome, DismissOutcome::NothingToDismiss);
        assert_eq!(store.head().await, Seq::new(2));
    }

    #[tokio::test]
    async fn should_report_conflict_when_head_moves_before_append() {
        // GIVEN a single open draft at head 1
        let journal = RacingJournal {
            store: store_with(vec![intent("a")]).await,
            raced: AtomicBool::new(false),
            appends: AtomicUsize::new(0),
        };

        // WHEN another writer advances the head to 2 before the dismissal appends
        let outcome = dismiss_latest_unsent_draft(&journal).await.unwrap();

        // THEN the CAS append is rejected once and never retried
        assert_eq!(
            outcome,
            DismissOutcome::Conflict {
                compose_id: ComposeId::new("a"),
                expected: Seq::new(1),
                actual: Seq::new(2),
            }
        );
        assert_eq!(journal.appends.load(Ordering::SeqCst), 1);
        let facts = journal.store.facts().await;
        assert_eq!(facts.len(), 2);
        assert!(!facts
            .iter()
            .any(|fact| matches!(fact, Fact::ComposeDismissed { .. })));
    }

    #[test]
    fn should_find_target_after_horizon_only() {
        let facts: Vector<Fact> = vec![Fact::remote_sent("x"), intent("late")].into();
        assert_eq!(find_target(&facts), Ok(&ComposeId::new("late")));
    }
}
