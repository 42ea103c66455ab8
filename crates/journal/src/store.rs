//! In-memory session store.
//!
//! Holds the journal, the selection state and the latest status as one
//! immutable snapshot. Every commit swaps in a new snapshot and publishes a
//! [`StoreTransition`] while the write lock is still held, so subscribers see
//! transitions in commit order.

use std::sync::Arc;

use async_trait::async_trait;
use im::Vector;
use parley_core::{PlannerId, Seq, TaskId};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

use crate::error::{JournalError, Result};
use crate::fact::Fact;
use crate::journal::{AppendOptions, AppendReceipt, FactJournal};
use crate::selection::{AppliedConfig, Selection};
use crate::status::{PlanPhase, StatusReport, StatusSink};

/// Default capacity of the transition channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Everything the store holds at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub selection: Selection,
    pub facts: Vector<Fact>,
    pub status: StatusReport,
    /// Bumped on every commit.
    pub version: u64,
}

impl StoreSnapshot {
    /// Journal head of this snapshot.
    pub fn head(&self) -> Seq {
        Seq::from_len(self.facts.len())
    }
}

/// A committed change.
#[derive(Debug, Clone)]
pub struct StoreTransition {
    pub previous: Arc<StoreSnapshot>,
    pub next: Arc<StoreSnapshot>,
}

impl StoreTransition {
    /// Whether the journal head moved.
    pub fn head_changed(&self) -> bool {
        self.previous.head() != self.next.head()
    }
}

/// Subscription handle for receiving transitions.
pub struct StoreSubscription {
    receiver: broadcast::Receiver<StoreTransition>,
}

impl StoreSubscription {
    /// Receive the next transition.
    ///
    /// # Errors
    ///
    /// Returns `Lagged` when transitions were dropped because this subscriber
    /// fell behind, and `ChannelClosed` once the store is gone.
    pub async fn recv(&mut self) -> Result<StoreTransition> {
        self.receiver.recv().await.map_err(|e| match e {
            RecvError::Closed => JournalError::ChannelClosed,
            RecvError::Lagged(skipped) => JournalError::Lagged { skipped },
        })
    }

    /// Receive a transition if one is already queued.
    ///
    /// # Errors
    ///
    /// Same as [`StoreSubscription::recv`].
    pub fn try_recv(&mut self) -> Result<Option<StoreTransition>> {
        match self.receiver.try_recv() {
            Ok(transition) => Ok(Some(transition)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(JournalError::ChannelClosed),
            Err(TryRecvError::Lagged(skipped)) => Err(JournalError::Lagged { skipped }),
        }
    }
}

/// In-memory store for facts, selection and status.
pub struct SessionStore {
    state: RwLock<Arc<StoreSnapshot>>,
    transitions: broadcast::Sender<StoreTransition>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store with the given transition channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (transitions, _) = broadcast::channel(capacity.max(1));
        Self {
            state: RwLock::new(Arc::new(StoreSnapshot::default())),
            transitions,
        }
    }

    /// Create an empty store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribe to committed transitions.
    pub fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            receiver: self.transitions.subscribe(),
        }
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&*self.state.read().await)
    }

    /// Current selection.
    pub async fn selection(&self) -> Selection {
        self.state.read().await.selection.clone()
    }

    /// Current status.
    pub async fn status(&self) -> StatusReport {
        self.state.read().await.status.clone()
    }

    /// Edit the selection in a single commit.
    pub async fn update_selection(&self, edit: impl FnOnce(&mut Selection) + Send) {
        self.commit(|snapshot| {
            let mut next = snapshot.clone();
            edit(&mut next.selection);
            next
        })
        .await;
    }

    /// Switch the active planner. `None` disables planning.
    pub async fn select_planner(&self, planner_id: Option<PlannerId>) {
        self.update_selection(|selection| selection.planner_id = planner_id)
            .await;
    }

    /// Switch the task context.
    pub async fn set_task(&self, task_id: Option<TaskId>) {
        self.update_selection(|selection| selection.task_id = task_id)
            .await;
    }

    /// Mark a planner ready or not ready.
    pub async fn set_ready(&self, planner_id: PlannerId, ready: bool) {
        self.update_selection(|selection| {
            selection.ready_by_planner.insert(planner_id, ready);
        })
        .await;
    }

    /// Apply configuration to a planner.
    pub async fn apply_config(&self, planner_id: PlannerId, applied: AppliedConfig) {
        self.update_selection(|selection| {
            selection.applied_by_planner.insert(planner_id, applied);
        })
        .await;
    }

    async fn commit(&self, change: impl FnOnce(&StoreSnapshot) -> StoreSnapshot + Send) {
        // Infallible change; the Ok arm is the only one reachable.
        let _ = self
            .try_commit(|snapshot| Ok((change(snapshot), ())))
            .await;
    }

    async fn try_commit<T: Send>(
        &self,
        change: impl FnOnce(&StoreSnapshot) -> Result<(StoreSnapshot, T)> + Send,
    ) -> Result<T> {
        let mut guard = self.state.write().await;
        let previous = Arc::clone(&*guard);
        let (mut next, output) = change(&previous)?;
        next.version = previous.version.saturating_add(1);

        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        trace!(version = next.version, head = %next.head(), "Committed snapshot");

        // No subscribers is fine.
        let _ = self.transitions.send(StoreTransition { previous, next });
        Ok(output)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactJournal for SessionStore {
    async fn facts(&self) -> Vector<Fact> {
        self.state.read().await.facts.clone()
    }

    async fn head(&self) -> Seq {
        self.state.read().await.head()
    }

    async fn append(&self, batch: Vec<Fact>, options: AppendOptions) -> Result<AppendReceipt> {
        if batch.is_empty() {
            let head = self.head().await;
            return match options.cas_base_seq {
                Some(expected) if expected != head => {
                    Err(JournalError::cas_conflict(expected, head))
                }
                _ => Ok(AppendReceipt {
                    base: head,
                    head,
                    appended: 0,
                }),
            };
        }

        let appended = batch.len();
        let result = self
            .try_commit(|snapshot| {
                let base = snapshot.head();
                if let Some(expected) = options.cas_base_seq {
                    if expected != base {
                        return Err(JournalError::cas_conflict(expected, base));
                    }
                }
                let mut next = snapshot.clone();
                next.facts.extend(batch);
                let head = next.head();
                Ok((next, AppendReceipt { base, head, appended }))
            })
            .await;

        match &result {
            Ok(receipt) => debug!(
                appended,
                base = %receipt.base,
                head = %receipt.head,
                "Appended facts"
            ),
            Err(e) => debug!(error = %e, "Append rejected"),
        }
        result
    }
}

#[async_trait]
impl StatusSink for SessionStore {
    async fn set_status(&self, phase: PlanPhase, label: Option<String>, progress: Option<f32>) {
        self.commit(|snapshot| {
            let mut next = snapshot.clone();
            next.status = StatusReport::new(phase, label, progress);
            next
        })
        .await;
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
    use parley_core::ComposeId;

    #[tokio::test]
    async fn should_append_and_advance_head() {
        let store = SessionStore::new();
        assert_eq!(store.head().await, Seq::ZERO);

        let receipt = store
            .append(
                vec![Fact::remote_sent("hi"), Fact::note("n")],
                AppendOptions::unconditional(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.base, Seq::ZERO);
        assert_eq!(receipt.head, Seq::new(2));
        assert_eq!(store.facts().await.len(), 2);
    }

    #[tokio::test]
    async fn should_reject_stale_cas_base_and_apply_nothing() {
        let store = SessionStore::new();
        store
            .append(vec![Fact::remote_sent("a")], AppendOptions::cas(Seq::ZERO))
            .await
            .unwrap();

        let err = store
            .append(
                vec![Fact::compose_dismissed(ComposeId::new("x"))],
                AppendOptions::cas(Seq::ZERO),
            )
            .await
            .unwrap_err();

        assert_eq!(err, JournalError::cas_conflict(Seq::ZERO, Seq::new(1)));
        assert_eq!(store.head().await, Seq::new(1));
    }

    #[tokio::test]
    async fn should_treat_empty_batch_as_noop() {
        let store = SessionStore::new();
        let mut sub = store.subscribe();

        let receipt = store
            .append(Vec::new(), AppendOptions::unconditional())
            .await
            .unwrap();

        assert_eq!(receipt.appended, 0);
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn should_publish_transitions_in_commit_order() {
        let store = SessionStore::new();
        let mut sub = store.subscribe();
        let id = PlannerId::from_static("simple-demo");

        store.select_planner(Some(id.clone())).await;
        store
            .append(vec![Fact::note("x")], AppendOptions::unconditional())
            .await
            .unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(first.previous.selection.planner_id, None);
        assert_eq!(first.next.selection.planner_id, Some(id));
        assert!(!first.head_changed());

        let second = sub.recv().await.unwrap();
        assert!(second.head_changed());
        assert_eq!(second.next.version, 2);
    }

    #[tokio::test]
    async fn should_replace_map_identity_on_every_ready_update() {
        let store = SessionStore::new();
        let id = PlannerId::from_static("simple-demo");
        store.set_ready(id.clone(), true).await;
        let before = store.selection().await;

        store.set_ready(id, true).await;
        let after = store.selection().await;

        assert!(!before.ready_by_planner.ptr_eq(&after.ready_by_planner));
        assert!(before
            .applied_by_planner
            .ptr_eq(&after.applied_by_planner));
    }

    #[tokio::test]
    async fn should_record_status_updates() {
        let store = SessionStore::new();
        store
            .set_status(PlanPhase::Planning, Some("demo".to_string()), Some(0.5))
            .await;

        let status = store.status().await;
        assert_eq!(status.phase, PlanPhase::Planning);
        assert_eq!(status.label.as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn should_report_lag_when_subscriber_falls_behind() {
        let store = SessionStore::with_capacity(1);
        let mut sub = store.subscribe();

        store.set_task(Some(TaskId::new("t1"))).await;
        store.set_task(Some(TaskId::new("t2"))).await;

        let err = sub.recv().await.unwrap_err();
        assert!(matches!(err, JournalError::Lagged { .. }));
    }
}
