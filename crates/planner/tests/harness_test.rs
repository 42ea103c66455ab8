//! Scheduling behaviour of the planning harness.
//!
//! - Overlapping requests coalesce into one follow-up pass
//! - Output planned against a moved journal is discarded
//! - A retired harness starts no further passes

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::{PlannerId, Seq};
use parley_journal::{AppendOptions, Fact, FactJournal, PlanPhase, SessionStore};
use parley_planner::{
    HarnessBindings, HarnessConfig, HarnessContext, PassOutcome, PlanRequest, Planner,
    PlannerHarness, ProposedAction, Result, SchedulingEngine, ScriptedProvider,
};
use tokio::sync::Semaphore;

/// Planner that counts passes and blocks each one until a permit is released.
struct GatedPlanner {
    id: PlannerId,
    calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedPlanner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: PlannerId::from_static("gated"),
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for GatedPlanner {
    fn id(&self) -> &PlannerId {
        &self.id
    }

    fn name(&self) -> &str {
        "Gated"
    }

    async fn plan(&self, _request: &PlanRequest<'_>) -> Result<Vec<ProposedAction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        Ok(Vec::new())
    }
}

/// Planner that lets another writer in before proposing its draft.
struct RacingPlanner {
    id: PlannerId,
    store: Arc<SessionStore>,
}

#[async_trait]
impl Planner for RacingPlanner {
    fn id(&self) -> &PlannerId {
        &self.id
    }

    fn name(&self) -> &str {
        "Racing"
    }

    async fn plan(&self, _request: &PlanRequest<'_>) -> Result<Vec<ProposedAction>> {
        self.store
            .append(
                vec![Fact::remote_sent("interloper")],
                AppendOptions::unconditional(),
            )
            .await?;
        Ok(vec![ProposedAction::Compose {
            text: "late draft".to_string(),
        }])
    }
}

fn harness(store: &Arc<SessionStore>, planner: Arc<dyn Planner>) -> PlannerHarness {
    PlannerHarness::new(
        HarnessBindings::from_store(Arc::clone(store)),
        planner,
        HarnessConfig::new(),
        HarnessContext::new("counterpart", "test-model"),
        Arc::new(ScriptedProvider::new(vec!["reply".to_string()])),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(condition(), "condition not reached in time");
}

#[tokio::test]
async fn should_coalesce_requests_made_during_a_pass() {
    let store = SessionStore::new_arc();
    let planner = GatedPlanner::new();
    let engine = harness(&store, Arc::clone(&planner) as Arc<dyn Planner>);

    engine.schedule_plan().unwrap();
    wait_until(|| planner.calls() == 1).await;

    for _ in 0..3 {
        engine.schedule_plan().unwrap();
    }
    planner.gate.add_permits(10);

    wait_until(|| !engine.is_busy()).await;
    assert_eq!(planner.calls(), 2);
    assert_eq!(engine.passes_completed(), 2);
}

#[tokio::test]
async fn should_run_again_when_requested_after_idle() {
    let store = SessionStore::new_arc();
    let planner = GatedPlanner::new();
    planner.gate.add_permits(10);
    let engine = harness(&store, Arc::clone(&planner) as Arc<dyn Planner>);

    engine.schedule_plan().unwrap();
    wait_until(|| engine.passes_completed() == 1 && !engine.is_busy()).await;

    engine.schedule_plan().unwrap();
    wait_until(|| engine.passes_completed() == 2 && !engine.is_busy()).await;
    assert_eq!(planner.calls(), 2);
}

#[tokio::test]
async fn should_discard_output_when_journal_moved() {
    let store = SessionStore::new_arc();
    let planner = Arc::new(RacingPlanner {
        id: PlannerId::from_static("racing"),
        store: Arc::clone(&store),
    });
    let engine = harness(&store, planner);

    let outcome = engine.plan_once().await.unwrap();

    assert_eq!(
        outcome,
        PassOutcome::Stale {
            expected: Seq::ZERO,
            actual: Seq::new(1),
        }
    );
    let facts = store.facts().await;
    assert_eq!(facts.len(), 1);
    assert!(matches!(facts.front(), Some(Fact::RemoteSent { .. })));
    assert_eq!(store.status().await.phase, PlanPhase::Idle);
}

#[tokio::test]
async fn should_not_start_queued_pass_after_retirement() {
    let store = SessionStore::new_arc();
    let planner = GatedPlanner::new();
    let engine = harness(&store, Arc::clone(&planner) as Arc<dyn Planner>);

    engine.schedule_plan().unwrap();
    wait_until(|| planner.calls() == 1).await;
    engine.schedule_plan().unwrap();

    drop(engine);
    planner.gate.add_permits(10);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(planner.calls(), 1);
}
