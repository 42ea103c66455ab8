//! The reconciliation controller.
//!
//! One task consumes the store's transition stream in commit order. For each
//! transition it first decides whether to rebuild the engine, then runs the
//! dismissal if the decision asks for it, then decides whether to request a
//! pass. Because the dismissal's own append is a later transition, the pass
//! it provokes always lands on the engine built for the current one.

use std::sync::Arc;

use parley_core::{EngineId, PlannerId, Seq};
use parley_journal::{
    JournalError, Selection, SessionStore, StoreSnapshot, StoreSubscription, StoreTransition,
};
use parley_planner::{HarnessBindings, PlannerCatalog, Provider, SchedulingEngine};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::ControllerConfig;
use crate::decision::RebuildDecision;
use crate::dismissal::{dismiss_latest_unsent_draft, DismissOutcome};
use crate::engine::{resolve_engine_spec, EngineFactory, HarnessFactory};
use crate::error::{ControllerError, Result};
use crate::observer::{ControllerEvent, ControllerObserver, PassReason, TracingObserver};

/// What handling one transition did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    /// Store version of the transition's next snapshot.
    pub version: u64,
    pub decision: RebuildDecision,
    /// The engine built for this transition.
    pub rebuilt: Option<EngineId>,
    pub dismissal: Option<DismissOutcome>,
    /// Whether the head moved and a pass was requested.
    pub pass_requested: bool,
    /// The transition was already covered by an earlier one.
    pub skipped: bool,
}

impl TransitionReport {
    fn new(version: u64, decision: RebuildDecision) -> Self {
        Self {
            version,
            decision,
            rebuilt: None,
            dismissal: None,
            pass_requested: false,
            skipped: false,
        }
    }

    fn skipped(version: u64) -> Self {
        Self {
            skipped: true,
            ..Self::new(version, RebuildDecision::Keep)
        }
    }
}

#[derive(Default)]
struct ControllerState {
    started: bool,
    engine: Option<Arc<dyn SchedulingEngine>>,
    /// Engines built since `initialize()`.
    generation: u64,
    /// Last head a pass was requested for.
    last_seq: Seq,
    last_seen: Option<Arc<StoreSnapshot>>,
}

struct Runner {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct ControllerCore {
    store: Arc<SessionStore>,
    catalog: Arc<PlannerCatalog>,
    provider: Arc<dyn Provider>,
    factory: Arc<dyn EngineFactory>,
    observer: Arc<dyn ControllerObserver>,
    config: ControllerConfig,
    state: Mutex<ControllerState>,
    /// Serialises transition handling; `state` is only held between awaits.
    handling: Mutex<()>,
}

/// Keeps one scheduling engine in step with the session store.
pub struct ReconciliationController {
    core: Arc<ControllerCore>,
    runner: Mutex<Option<Runner>>,
}

/// Builder for [`ReconciliationController`].
pub struct ControllerBuilder {
    store: Arc<SessionStore>,
    catalog: Arc<PlannerCatalog>,
    provider: Arc<dyn Provider>,
    factory: Arc<dyn EngineFactory>,
    observer: Arc<dyn ControllerObserver>,
    config: ControllerConfig,
}

impl ControllerBuilder {
    /// Use a different engine factory.
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use a different observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ControllerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use a different configuration.
    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a stopped controller.
    pub fn build(self) -> ReconciliationController {
        ReconciliationController {
            core: Arc::new(ControllerCore {
                store: self.store,
                catalog: self.catalog,
                provider: self.provider,
                factory: self.factory,
                observer: self.observer,
                config: self.config,
                state: Mutex::new(ControllerState::default()),
                handling: Mutex::new(()),
            }),
            runner: Mutex::new(None),
        }
    }
}

impl ReconciliationController {
    /// Create a stopped controller with the harness factory and the tracing
    /// observer.
    ///
    /// `provider` is shared by every engine this controller builds.
    pub fn new(
        store: Arc<SessionStore>,
        catalog: Arc<PlannerCatalog>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self::builder(store, catalog, provider).build()
    }

    /// Start building a controller.
    pub fn builder(
        store: Arc<SessionStore>,
        catalog: Arc<PlannerCatalog>,
        provider: Arc<dyn Provider>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            store,
            catalog,
            provider,
            factory: Arc::new(HarnessFactory),
            observer: Arc::new(TracingObserver),
            config: ControllerConfig::default(),
        }
    }

    /// Start the controller.
    ///
    /// Subscribes to the store, builds the initial engine, records the
    /// current head and spawns the transition loop. Returns `Ok(false)` with
    /// no effect when already started.
    ///
    /// # Errors
    ///
    /// Currently infallible; an initial build failure is reported to the
    /// observer and retried on the next transition.
    pub async fn initialize(&self) -> Result<bool> {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            debug!("Controller already started");
            return Ok(false);
        }

        // Subscribe first so no commit between the snapshot and the loop is lost.
        let subscription = self.core.store.subscribe();
        self.core.bootstrap().await;

        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run_loop(Arc::clone(&self.core), subscription, stopped));
        *runner = Some(Runner { stop, task });

        info!("Controller started");
        Ok(true)
    }

    /// Stop the controller and drop its engine.
    ///
    /// A later `initialize()` starts afresh. Returns `Ok(false)` when the
    /// controller was not running.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub async fn shutdown(&self) -> Result<bool> {
        let mut runner = self.runner.lock().await;
        let Some(active) = runner.take() else {
            return Ok(false);
        };

        // The loop may already have exited on its own.
        let _ = active.stop.send(());
        if let Err(e) = active.task.await {
            warn!(error = %e, "Controller loop ended abnormally");
        }

        let _handling = self.core.handling.lock().await;
        *self.core.state.lock().await = ControllerState::default();
        info!("Controller stopped");
        Ok(true)
    }

    /// Handle one transition: rebuild decision, dismissal, then scheduling.
    ///
    /// Transitions at or below the last handled store version are skipped.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` before `initialize()`. Every other failure is
    /// reported to the observer and reflected in the report.
    pub async fn handle_transition(&self, transition: &StoreTransition) -> Result<TransitionReport> {
        self.core.handle_transition(transition).await
    }

    /// The engine currently receiving pass requests.
    pub async fn current_engine(&self) -> Option<Arc<dyn SchedulingEngine>> {
        self.core.state.lock().await.engine.clone()
    }

    /// Engines built since the controller was started.
    pub async fn generation(&self) -> u64 {
        self.core.state.lock().await.generation
    }

    /// Last head a pass was requested for.
    pub async fn last_seq(&self) -> Seq {
        self.core.state.lock().await.last_seq
    }

    /// Whether the controller is running.
    pub async fn is_started(&self) -> bool {
        self.core.state.lock().await.started
    }
}

impl ControllerCore {
    async fn bootstrap(&self) {
        let _handling = self.handling.lock().await;
        let snapshot = self.store.snapshot().await;
        let mut state = self.state.lock().await;

        *state = ControllerState {
            started: true,
            last_seq: snapshot.head(),
            last_seen: Some(Arc::clone(&snapshot)),
            ..ControllerState::default()
        };
        // A failure here leaves no engine; the next transition retries.
        let _ = self.rebuild(&mut state, &snapshot.selection);
    }

    async fn handle_transition(&self, transition: &StoreTransition) -> Result<TransitionReport> {
        let _handling = self.handling.lock().await;
        let version = transition.next.version;

        let mut report = {
            let mut state = self.state.lock().await;
            if !state.started {
                return Err(ControllerError::NotStarted);
            }
            if state
                .last_seen
                .as_ref()
                .is_some_and(|seen| version <= seen.version)
            {
                trace!(version, "Skipping transition already handled");
                return Ok(TransitionReport::skipped(version));
            }

            let decision = RebuildDecision::evaluate(
                &transition.previous.selection,
                &transition.next.selection,
            );
            let mut report = TransitionReport::new(version, decision);
            debug!(version, decision = ?decision, "Handling transition");

            if decision.rebuilds() || state.engine.is_none() {
                report.rebuilt = self.rebuild(&mut state, &transition.next.selection).ok();
            }
            report
        };

        // Only a successful rebuild withdraws the draft.
        if report.decision.dismisses() && report.rebuilt.is_some() {
            match dismiss_latest_unsent_draft(self.store.as_ref()).await {
                Ok(outcome) => {
                    self.observer.on_event(&ControllerEvent::Dismissal {
                        outcome: outcome.clone(),
                    });
                    report.dismissal = Some(outcome);
                }
                Err(e) => self.observer.on_event(&ControllerEvent::DismissalFailed {
                    reason: e.to_string(),
                }),
            }
        }

        let mut state = self.state.lock().await;
        if !state.started {
            return Ok(report);
        }

        let head = transition.next.head();
        if head != state.last_seq {
            state.last_seq = head;
            if let Some(engine) = state.engine.as_ref() {
                report.pass_requested = true;
                self.request_pass(engine.as_ref(), PassReason::SequenceChanged { seq: head });
            }
        }

        state.last_seen = Some(Arc::clone(&transition.next));
        Ok(report)
    }

    /// Resynchronise after dropped transitions by treating everything since
    /// the last handled snapshot as one transition.
    async fn recover_from_lag(&self, skipped: u64) -> Result<TransitionReport> {
        self.observer.on_event(&ControllerEvent::Lagged { skipped });

        let previous = self
            .state
            .lock()
            .await
            .last_seen
            .clone()
            .unwrap_or_default();
        let next = self.store.snapshot().await;

        self.handle_transition(&StoreTransition { previous, next })
            .await
    }

    /// Replace the engine. On failure the previous engine stays in place.
    fn rebuild(&self, state: &mut ControllerState, selection: &Selection) -> Result<EngineId> {
        let spec = resolve_engine_spec(
            selection,
            &self.catalog,
            &self.config,
            HarnessBindings::from_store(Arc::clone(&self.store)),
            Arc::clone(&self.provider),
        );
        let planner_id: PlannerId = spec.planner.id().clone();

        match self.factory.build(spec) {
            Ok(engine) => {
                state.generation = state.generation.saturating_add(1);
                let engine_id = engine.id();
                self.observer.on_event(&ControllerEvent::EngineBuilt {
                    engine_id,
                    planner_id,
                    generation: state.generation,
                });

                // Dropping the old engine retires it.
                state.engine = Some(Arc::clone(&engine));
                self.request_pass(engine.as_ref(), PassReason::EngineBuilt);
                Ok(engine_id)
            }
            Err(e) => {
                self.observer.on_event(&ControllerEvent::RebuildFailed {
                    planner_id: selection.planner_id.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn request_pass(&self, engine: &dyn SchedulingEngine, reason: PassReason) {
        let engine_id = engine.id();
        match engine.schedule_plan() {
            Ok(()) => self
                .observer
                .on_event(&ControllerEvent::PassRequested { engine_id, reason }),
            Err(e) => self.observer.on_event(&ControllerEvent::ScheduleFailed {
                engine_id,
                reason: e.to_string(),
            }),
        }
    }
}

async fn run_loop(
    core: Arc<ControllerCore>,
    mut subscription: StoreSubscription,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = &mut stop => break,
            received = subscription.recv() => received,
        };

        let handled = match received {
            Ok(transition) => core.handle_transition(&transition).await,
            Err(JournalError::Lagged { skipped }) => core.recover_from_lag(skipped).await,
            Err(JournalError::ChannelClosed) => {
                debug!("Store closed, controller loop exiting");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Unexpected subscription error, controller loop exiting");
                break;
            }
        };

        if let Err(e) = handled {
            warn!(error = %e, "Transition not handled");
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
    use parley_journal::{AppendOptions, Fact, FactJournal};
    use parley_planner::{ScriptedProvider, SimpleDemoPlanner};
    use std::sync::{Mutex as StdMutex, OnceLock};
    use std::time::Duration;

    /// Records whether the controller state was free when a dismissal
    /// finished.
    #[derive(Default)]
    struct LockWitness {
        core: OnceLock<Arc<ControllerCore>>,
        free_at_dismissal: StdMutex<Vec<bool>>,
    }

    impl ControllerObserver for LockWitness {
        fn on_event(&self, event: &ControllerEvent) {
            if let (ControllerEvent::Dismissal { .. }, Some(core)) = (event, self.core.get()) {
                let free = core.state.try_lock().is_ok();
                self.free_at_dismissal.lock().unwrap().push(free);
            }
        }
    }

    fn controller(store: &Arc<SessionStore>) -> ReconciliationController {
        ReconciliationController::new(
            Arc::clone(store),
            Arc::new(PlannerCatalog::builtin()),
            Arc::new(ScriptedProvider::new(vec!["hello".to_string()])),
        )
    }

    #[tokio::test]
    async fn should_initialize_once() {
        let store = SessionStore::new_arc();
        let controller = controller(&store);

        assert!(controller.initialize().await.unwrap());
        assert!(!controller.initialize().await.unwrap());
        assert_eq!(controller.generation().await, 1);
        assert!(controller.is_started().await);

        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn should_reject_transitions_before_initialize() {
        let store = SessionStore::new_arc();
        let controller = controller(&store);
        let snapshot = store.snapshot().await;

        let err = controller
            .handle_transition(&StoreTransition {
                previous: Arc::clone(&snapshot),
                next: snapshot,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotStarted));
    }

    #[tokio::test]
    async fn should_reset_on_shutdown() {
        let store = SessionStore::new_arc();
        let controller = controller(&store);
        controller.initialize().await.unwrap();

        assert!(controller.shutdown().await.unwrap());
        assert!(!controller.shutdown().await.unwrap());
        assert!(!controller.is_started().await);
        assert!(controller.current_engine().await.is_none());
        assert_eq!(controller.generation().await, 0);

        assert!(controller.initialize().await.unwrap());
        assert_eq!(controller.generation().await, 1);
        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn should_release_state_while_dismissing() {
        let store = SessionStore::new_arc();
        let observer = Arc::new(LockWitness::default());
        let controller = ReconciliationController::builder(
            Arc::clone(&store),
            Arc::new(PlannerCatalog::builtin()),
            Arc::new(ScriptedProvider::new(vec!["hello".to_string()])),
        )
        .observer(Arc::clone(&observer) as Arc<dyn ControllerObserver>)
        .build();
        let _ = observer.core.set(Arc::clone(&controller.core));
        controller.initialize().await.unwrap();

        let demo = PlannerId::from_static(SimpleDemoPlanner::ID);
        store
            .append(vec![Fact::compose_intent("draft")], AppendOptions::unconditional())
            .await
            .unwrap();
        store.set_ready(demo.clone(), true).await;
        store.select_planner(Some(demo)).await;

        for _ in 0..200 {
            if !observer.free_at_dismissal.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let seen = observer.free_at_dismissal.lock().unwrap().clone();
        assert_eq!(seen, vec![true]);

        controller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn should_skip_transitions_already_seen() {
        let store = SessionStore::new_arc();
        let mut sub = store.subscribe();
        store
            .append(vec![Fact::note("before")], AppendOptions::unconditional())
            .await
            .unwrap();
        let early = sub.recv().await.unwrap();

        let controller = controller(&store);
        controller.initialize().await.unwrap();

        let report = controller.handle_transition(&early).await.unwrap();
        assert!(report.skipped);
        assert_eq!(controller.last_seq().await, Seq::new(1));

        controller.shutdown().await.unwrap();
    }
}
