//! Planning harness: the scheduling engine.
//!
//! A harness runs planning passes on request. Requests are fire-and-forget
//! and coalesce: at most one pass is in flight and at most one follow-up is
//! queued behind it. Requests that arrive before a pass reads the journal are
//! absorbed by that pass.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parley_core::{EngineId, PlannerId, Seq};
use parley_journal::{
    AppendOptions, AppendReceipt, FactJournal, JournalError, PlanPhase, StatusSink,
};
use tracing::{debug, trace, warn};

use crate::config::{HarnessConfig, HarnessContext};
use crate::error::{PlannerError, Result};
use crate::planner::{PlanRequest, Planner, ProposedAction};
use crate::provider::Provider;

/// Engine that runs planning passes on request.
pub trait SchedulingEngine: Send + Sync {
    /// Instance id.
    fn id(&self) -> EngineId;

    /// Planner this engine drives.
    fn planner_id(&self) -> &PlannerId;

    /// Request a planning pass. Returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error when the pass cannot be started at all.
    fn schedule_plan(&self) -> Result<()>;
}

/// Live accessors into shared state.
///
/// Every call goes through to the current state; nothing is captured at
/// construction time.
#[derive(Clone)]
pub struct HarnessBindings {
    pub journal: Arc<dyn FactJournal>,
    pub status: Arc<dyn StatusSink>,
}

impl HarnessBindings {
    /// Bind both accessors to one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: FactJournal + StatusSink + 'static,
    {
        Self {
            journal: Arc::clone(&store) as Arc<dyn FactJournal>,
            status: store,
        }
    }
}

impl fmt::Debug for HarnessBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessBindings").finish_non_exhaustive()
    }
}

/// What a single pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Planner output was appended.
    Applied {
        receipt: AppendReceipt,
        actions: Vec<ProposedAction>,
    },
    /// The planner had nothing to propose.
    NoActions,
    /// The journal moved during the pass; output was discarded.
    Stale { expected: Seq, actual: Seq },
}

/// No pass running.
const IDLE: u8 = 0;
/// A pass is running.
const RUNNING: u8 = 1;
/// A pass is running and a follow-up is queued behind it.
const QUEUED: u8 = 2;

struct HarnessInner {
    id: EngineId,
    bindings: HarnessBindings,
    planner: Arc<dyn Planner>,
    config: HarnessConfig,
    context: HarnessContext,
    provider: Arc<dyn Provider>,
    /// `IDLE`, `RUNNING` or `QUEUED`.
    state: AtomicU8,
    retired: AtomicBool,
    passes: AtomicU64,
}

/// Scheduling engine bound to one planner.
///
/// Dropping the harness retires it: a pass already running finishes, but no
/// queued follow-up starts.
pub struct PlannerHarness {
    inner: Arc<HarnessInner>,
}

impl PlannerHarness {
    /// Create a harness.
    pub fn new(
        bindings: HarnessBindings,
        planner: Arc<dyn Planner>,
        config: HarnessConfig,
        context: HarnessContext,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            inner: Arc::new(HarnessInner {
                id: EngineId::new(),
                bindings,
                planner,
                config,
                context,
                provider,
                state: AtomicU8::new(IDLE),
                retired: AtomicBool::new(false),
                passes: AtomicU64::new(0),
            }),
        }
    }

    /// Harness configuration in effect.
    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    /// Context in effect.
    pub fn context(&self) -> &HarnessContext {
        &self.inner.context
    }

    /// Number of passes run to completion.
    pub fn passes_completed(&self) -> u64 {
        self.inner.passes.load(Ordering::Acquire)
    }

    /// Whether a pass is running or queued.
    pub fn is_busy(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != IDLE
    }

    /// Run one pass inline, bypassing the request queue.
    ///
    /// # Errors
    ///
    /// Returns planner, provider, or non-CAS journal failures.
    pub async fn plan_once(&self) -> Result<PassOutcome> {
        self.inner.run_pass().await
    }
}

impl SchedulingEngine for PlannerHarness {
    fn id(&self) -> EngineId {
        self.inner.id
    }

    fn planner_id(&self) -> &PlannerId {
        self.inner.planner.id()
    }

    fn schedule_plan(&self) -> Result<()> {
        if !self.inner.request() {
            trace!(engine_id = %self.inner.id, "Pass in flight, follow-up queued");
            return Ok(());
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drive(Arc::clone(&self.inner)));
                Ok(())
            }
            Err(_) => {
                self.inner.state.store(IDLE, Ordering::Release);
                Err(PlannerError::NoRuntime)
            }
        }
    }
}

impl Drop for PlannerHarness {
    fn drop(&mut self) {
        self.inner.retired.store(true, Ordering::Release);
        debug!(engine_id = %self.inner.id, "Engine retired");
    }
}

impl fmt::Debug for PlannerHarness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerHarness")
            .field("id", &self.inner.id)
            .field("planner_id", self.inner.planner.id())
            .field("config", &self.inner.config)
            .field("context", &self.inner.context)
            .finish_non_exhaustive()
    }
}

async fn drive(inner: Arc<HarnessInner>) {
    loop {
        inner.begin_pass();

        if inner.retired.load(Ordering::Acquire) {
            debug!(engine_id = %inner.id, "Skipping pass on retired engine");
        } else {
            match inner.run_pass().await {
                Ok(outcome) => debug!(engine_id = %inner.id, outcome = ?outcome, "Pass finished"),
                Err(e) => warn!(engine_id = %inner.id, error = %e, "Pass failed"),
            }
            inner.passes.fetch_add(1, Ordering::AcqRel);
        }

        if !inner.finish_pass() {
            break;
        }
    }
}

impl HarnessInner {
    /// Record a pass request. Returns `true` when the caller must start the
    /// driver, `false` when a running pass will pick the request up.
    fn request(&self) -> bool {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                Some(if state == IDLE { RUNNING } else { QUEUED })
            })
            .unwrap_or_else(|state| state);
        previous == IDLE
    }

    /// Absorb any request queued before this pass reads the journal.
    fn begin_pass(&self) {
        let _ = self
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Settle the state after a pass. Returns `true` when a queued follow-up
    /// should run.
    fn finish_pass(&self) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => false,
            Err(_) if self.retired.load(Ordering::Acquire) => {
                self.state.store(IDLE, Ordering::Release);
                false
            }
            Err(_) => true,
        }
    }

    async fn run_pass(&self) -> Result<PassOutcome> {
        let journal = &self.bindings.journal;
        let status = &self.bindings.status;

        // Facts may run ahead of this head; the CAS append catches that.
        let head = journal.head().await;
        let facts = journal.facts().await;

        status
            .set_status(
                PlanPhase::Planning,
                Some(self.planner.name().to_string()),
                None,
            )
            .await;

        let request = PlanRequest {
            facts: &facts,
            head,
            config: &self.config,
            context: &self.context,
            provider: self.provider.as_ref(),
        };

        let actions = match self.planner.plan(&request).await {
            Ok(actions) => actions,
            Err(e) => {
                status
                    .set_status(PlanPhase::Error, Some(e.to_string()), None)
                    .await;
                return Err(e);
            }
        };

        if actions.is_empty() {
            status.set_status(PlanPhase::Idle, None, None).await;
            return Ok(PassOutcome::NoActions);
        }

        status
            .set_status(
                PlanPhase::Applying,
                Some(self.planner.name().to_string()),
                Some(1.0),
            )
            .await;

        let batch = actions.iter().cloned().map(ProposedAction::into_fact).collect();
        match journal.append(batch, AppendOptions::cas(head)).await {
            Ok(receipt) => {
                status.set_status(PlanPhase::Idle, None, None).await;
                Ok(PassOutcome::Applied { receipt, actions })
            }
            Err(JournalError::CasConflict { expected, actual }) => {
                debug!(
                    engine_id = %self.id,
                    expected = %expected,
                    actual = %actual,
                    "Discarding stale planner output"
                );
                status.set_status(PlanPhase::Idle, None, None).await;
                Ok(PassOutcome::Stale { expected, actual })
            }
            Err(e) => {
                status
                    .set_status(PlanPhase::Error, Some(e.to_string()), None)
                    .await;
                Err(e.into())
            }
        }
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
    use crate::planner::NopPlanner;
    use crate::planners::SimpleDemoPlanner;
    use crate::provider::ScriptedProvider;
    use parley_journal::{Fact, SessionStore};

    fn harness(store: &Arc<SessionStore>, planner: Arc<dyn Planner>) -> PlannerHarness {
        PlannerHarness::new(
            HarnessBindings::from_store(Arc::clone(store)),
            planner,
            HarnessConfig::new(),
            HarnessContext::new("counterpart", "m"),
            Arc::new(ScriptedProvider::new(vec!["hello there".to_string()])),
        )
    }

    #[tokio::test]
    async fn should_append_planner_output_with_cas() {
        let store = SessionStore::new_arc();
        store
            .append(vec![Fact::remote_sent("hi")], AppendOptions::unconditional())
            .await
            .unwrap();

        let engine = harness(&store, Arc::new(SimpleDemoPlanner::new()));
        let outcome = engine.plan_once().await.unwrap();

        assert!(matches!(outcome, PassOutcome::Applied { receipt, .. } if receipt.base == Seq::new(1)));
        assert_eq!(store.head().await, Seq::new(2));
        assert_eq!(store.status().await.phase, PlanPhase::Idle);
    }

    #[tokio::test]
    async fn should_report_no_actions_for_nop_planner() {
        let store = SessionStore::new_arc();
        let engine = harness(&store, Arc::new(NopPlanner::new()));

        assert_eq!(engine.plan_once().await.unwrap(), PassOutcome::NoActions);
        assert_eq!(store.head().await, Seq::ZERO);
    }

    #[test]
    fn should_fail_to_schedule_outside_runtime() {
        let store = SessionStore::new_arc();
        let engine = harness(&store, Arc::new(NopPlanner::new()));

        assert_eq!(engine.schedule_plan(), Err(PlannerError::NoRuntime));
        assert!(!engine.is_busy());
    }

    #[test]
    fn should_keep_request_that_races_a_finishing_pass() {
        let store = SessionStore::new_arc();
        let engine = harness(&store, Arc::new(NopPlanner::new()));
        let inner = &engine.inner;

        // A request during a pass is queued and the finishing pass runs it.
        assert!(inner.request());
        assert!(!inner.request());
        assert!(inner.finish_pass());
        inner.begin_pass();
        assert_eq!(inner.state.load(Ordering::Acquire), RUNNING);

        // Once the pass has gone idle, the next request starts a new driver.
        assert!(!inner.finish_pass());
        assert!(!engine.is_busy());
        assert!(inner.request());
        assert!(engine.is_busy());
    }

    #[test]
    fn should_coalesce_requests_into_one_follow_up() {
        let store = SessionStore::new_arc();
        let engine = harness(&store, Arc::new(NopPlanner::new()));
        let inner = &engine.inner;

        assert!(inner.request());
        for _ in 0..3 {
            assert!(!inner.request());
        }
        assert!(inner.finish_pass());
        inner.begin_pass();
        assert!(!inner.finish_pass());
    }

    #[test]
    fn should_drop_follow_up_once_retired() {
        let store = SessionStore::new_arc();
        let engine = harness(&store, Arc::new(NopPlanner::new()));
        let inner = Arc::clone(&engine.inner);

        assert!(inner.request());
        assert!(!inner.request());
        drop(engine);

        assert!(!inner.finish_pass());
        assert_eq!(inner.state.load(Ordering::Acquire), IDLE);
    }

    #[tokio::test]
    async fn should_expose_planner_identity() {
        let store = SessionStore::new_arc();
        let engine = harness(&store, Arc::new(SimpleDemoPlanner::new()));
        assert_eq!(engine.planner_id().as_str(), SimpleDemoPlanner::ID);
        assert_eq!(engine.context().model, "m");
        assert!(engine.config().is_empty());
    }
}
