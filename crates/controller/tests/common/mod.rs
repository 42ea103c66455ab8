//! Shared fixtures for controller integration tests.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_controller::{
    ControllerError, ControllerEvent, ControllerObserver, EngineFactory, EngineSpec,
    HarnessFactory, PassReason, ReconciliationController,
};
use parley_core::{EngineId, PlannerId, Seq};
use parley_journal::SessionStore;
use parley_planner::{
    PlanRequest, Planner, PlannerCatalog, ProposedAction, SchedulingEngine, ScriptedProvider,
};

pub const ALPHA: &str = "alpha";
pub const BETA: &str = "beta";

pub fn alpha() -> PlannerId {
    PlannerId::from_static(ALPHA)
}

pub fn beta() -> PlannerId {
    PlannerId::from_static(BETA)
}

/// Planner that never proposes anything, under any id.
pub struct QuietPlanner {
    id: PlannerId,
}

impl QuietPlanner {
    pub fn new(id: PlannerId) -> Arc<Self> {
        Arc::new(Self { id })
    }
}

#[async_trait]
impl Planner for QuietPlanner {
    fn id(&self) -> &PlannerId {
        &self.id
    }

    fn name(&self) -> &str {
        "Quiet"
    }

    async fn plan(&self, _request: &PlanRequest<'_>) -> parley_planner::Result<Vec<ProposedAction>> {
        Ok(Vec::new())
    }
}

/// Catalog with two quiet planners, `alpha` and `beta`.
pub fn quiet_catalog() -> Arc<PlannerCatalog> {
    Arc::new(
        PlannerCatalog::new()
            .with_planner(QuietPlanner::new(alpha()), None)
            .with_planner(QuietPlanner::new(beta()), None),
    )
}

/// Keeps every event it sees.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ControllerEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn built_engines(&self) -> Vec<EngineId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ControllerEvent::EngineBuilt { engine_id, .. } => Some(engine_id),
                _ => None,
            })
            .collect()
    }

    /// Engines that received a pass request for the head reaching `seq`.
    pub fn passes_for_seq(&self, seq: Seq) -> Vec<EngineId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ControllerEvent::PassRequested {
                    engine_id,
                    reason: PassReason::SequenceChanged { seq: requested },
                } if requested == seq => Some(engine_id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&ControllerEvent) -> bool) -> usize {
        self.events().iter().filter(|event| matches(event)).count()
    }
}

impl ControllerObserver for RecordingObserver {
    fn on_event(&self, event: &ControllerEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Harness factory that can be told to fail.
#[derive(Default)]
pub struct FlakyFactory {
    failing: AtomicBool,
    built: AtomicUsize,
}

impl FlakyFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl EngineFactory for FlakyFactory {
    fn build(&self, spec: EngineSpec) -> parley_controller::Result<Arc<dyn SchedulingEngine>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ControllerError::engine_construction(
                spec.planner.id().clone(),
                "factory offline",
            ));
        }
        self.built.fetch_add(1, Ordering::SeqCst);
        HarnessFactory.build(spec)
    }
}

/// Controller over `store` with the quiet catalog and a recording observer.
pub fn recorded_controller(
    store: &Arc<SessionStore>,
    observer: &Arc<RecordingObserver>,
) -> ReconciliationController {
    ReconciliationController::builder(
        Arc::clone(store),
        quiet_catalog(),
        Arc::new(ScriptedProvider::new(vec!["reply".to_string()])),
    )
    .observer(Arc::clone(observer) as Arc<dyn ControllerObserver>)
    .build()
}

/// Poll `check` until it holds, failing the test after about two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(check().await, "condition not reached in time");
}

/// Give the controller loop a chance to drain pending transitions.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
