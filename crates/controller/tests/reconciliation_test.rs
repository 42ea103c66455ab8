//! End-to-end reconciliation scenarios against a live session store.
//!
//! - Planner switch rebuilds, then dismisses, and the follow-up pass lands
//!   on the new engine
//! - Task and readiness changes rebuild without dismissing
//! - The remote-send horizon and earlier dismissals are respected
//! - Unchanged heads never request a pass
//! - Failed engine construction keeps the previous engine

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

mod common;

use std::sync::Arc;

use common::{alpha, beta, eventually, recorded_controller, settle, FlakyFactory, RecordingObserver};
use parley_controller::{
    ControllerEvent, ControllerObserver, DismissOutcome, ReconciliationController,
};
use parley_core::{ComposeId, Seq, TaskId};
use parley_journal::{
    AppendOptions, AppliedConfig, Fact, FactJournal, SessionStore, StoreSnapshot, StoreTransition,
};
use parley_planner::ScriptedProvider;

fn intent(id: &str) -> Fact {
    Fact::ComposeIntent {
        compose_id: ComposeId::new(id),
        text: format!("draft {id}"),
    }
}

/// Store with both planners ready, `alpha` selected, and `facts` appended.
async fn session_with(facts: Vec<Fact>) -> Arc<SessionStore> {
    let store = SessionStore::new_arc();
    store.set_ready(alpha(), true).await;
    store.set_ready(beta(), true).await;
    store.select_planner(Some(alpha())).await;
    if !facts.is_empty() {
        store
            .append(facts, AppendOptions::unconditional())
            .await
            .unwrap();
    }
    store
}

fn dismissals(observer: &RecordingObserver) -> Vec<DismissOutcome> {
    observer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ControllerEvent::Dismissal { outcome } => Some(outcome),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn should_schedule_dismissal_follow_up_on_new_engine() {
    // GIVEN an open draft under planner alpha
    let store = session_with(vec![intent("a")]).await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();
    let retired = controller.current_engine().await.unwrap().id();

    // WHEN the user switches to the ready planner beta
    store.select_planner(Some(beta())).await;

    // THEN the draft is dismissed and the pass for the new head targets beta's engine
    eventually(|| async { !observer.passes_for_seq(Seq::new(2)).is_empty() }).await;

    assert_eq!(
        dismissals(&observer),
        vec![DismissOutcome::Dismissed {
            compose_id: ComposeId::new("a"),
            head: Seq::new(2),
        }]
    );

    let built = observer.built_engines();
    assert_eq!(built.len(), 2);
    let fresh = built[1];
    assert_ne!(fresh, retired);
    assert_eq!(observer.passes_for_seq(Seq::new(2)), vec![fresh]);

    let current = controller.current_engine().await.unwrap();
    assert_eq!(current.id(), fresh);
    assert_eq!(current.planner_id(), &beta());

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn should_dismiss_on_applied_config_change() {
    let store = session_with(vec![intent("a")]).await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();

    store
        .apply_config(alpha(), AppliedConfig::with_model("bigger"))
        .await;

    eventually(|| async { store.head().await == Seq::new(2) }).await;
    assert_eq!(
        store.facts().await.back(),
        Some(&Fact::compose_dismissed(ComposeId::new("a")))
    );

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn should_rebuild_without_dismissal_on_task_change() {
    // GIVEN an open draft under planner alpha
    let store = session_with(vec![intent("a")]).await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();

    // WHEN the task changes
    store.set_task(Some(TaskId::new("t-1"))).await;
    eventually(|| async { controller.generation().await == 2 }).await;

    // AND readiness is touched
    store.set_ready(beta(), false).await;
    eventually(|| async { controller.generation().await == 3 }).await;
    settle().await;

    // THEN the engine was rebuilt each time but nothing was dismissed
    assert!(dismissals(&observer).is_empty());
    assert_eq!(store.head().await, Seq::new(1));
}

#[tokio::test]
async fn should_rebuild_without_dismissal_when_switch_and_task_change_together() {
    let store = session_with(vec![intent("a")]).await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();

    store
        .update_selection(|selection| {
            selection.planner_id = Some(beta());
            selection.task_id = Some(TaskId::new("t-2"));
        })
        .await;
    eventually(|| async { controller.generation().await == 2 }).await;
    settle().await;

    assert!(dismissals(&observer).is_empty());
    assert_eq!(store.head().await, Seq::new(1));
}

#[tokio::test]
async fn should_not_scan_past_remote_send() {
    let store = session_with(vec![intent("a"), Fact::remote_sent("hello")]).await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();

    store.select_planner(Some(beta())).await;
    eventually(|| async { !dismissals(&observer).is_empty() }).await;

    assert_eq!(dismissals(&observer), vec![DismissOutcome::HorizonReached]);
    assert_eq!(store.facts().await.len(), 2);
}

#[tokio::test]
async fn should_not_dismiss_a_draft_twice() {
    let store = session_with(vec![
        intent("a"),
        intent("b"),
        Fact::compose_dismissed(ComposeId::new("b")),
    ])
    .await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();

    store.select_planner(Some(beta())).await;
    eventually(|| async { store.head().await == Seq::new(4) }).await;
    assert_eq!(
        store.facts().await.back(),
        Some(&Fact::compose_dismissed(ComposeId::new("a")))
    );

    // Switching back finds nothing left to withdraw.
    store.select_planner(Some(alpha())).await;
    eventually(|| async { dismissals(&observer).len() == 2 }).await;
    assert_eq!(dismissals(&observer)[1], DismissOutcome::NothingToDismiss);
    assert_eq!(store.head().await, Seq::new(4));
}

#[tokio::test]
async fn should_request_at_most_one_pass_per_head() {
    let store = SessionStore::new_arc();
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();
    settle().await;

    let base = store.snapshot().await;
    let mut moved = (*base).clone();
    moved.facts.push_back(Fact::note("n"));
    moved.version = base.version + 100;
    let moved = Arc::new(moved);

    let mut repeat: StoreSnapshot = (*moved).clone();
    repeat.version = moved.version + 1;
    let repeat = Arc::new(repeat);

    let first = controller
        .handle_transition(&StoreTransition {
            previous: Arc::clone(&base),
            next: Arc::clone(&moved),
        })
        .await
        .unwrap();
    let second = controller
        .handle_transition(&StoreTransition {
            previous: moved,
            next: repeat,
        })
        .await
        .unwrap();

    assert!(first.pass_requested);
    assert!(!second.pass_requested);
    assert_eq!(observer.passes_for_seq(Seq::new(1)).len(), 1);
}

#[tokio::test]
async fn should_keep_previous_engine_when_construction_fails() {
    let store = session_with(vec![intent("a")]).await;
    let observer = RecordingObserver::new();
    let factory = FlakyFactory::new();
    let controller = ReconciliationController::builder(
        Arc::clone(&store),
        common::quiet_catalog(),
        Arc::new(ScriptedProvider::new(Vec::new())),
    )
    .factory(Arc::clone(&factory) as Arc<dyn parley_controller::EngineFactory>)
    .observer(Arc::clone(&observer) as Arc<dyn ControllerObserver>)
    .build();
    controller.initialize().await.unwrap();
    let original = controller.current_engine().await.unwrap().id();

    // WHEN construction fails during a planner switch
    factory.set_failing(true);
    store.select_planner(Some(beta())).await;
    eventually(|| async {
        observer.count(|event| matches!(event, ControllerEvent::RebuildFailed { .. })) == 1
    })
    .await;

    // THEN the old engine stays and the draft is left alone
    assert_eq!(controller.current_engine().await.unwrap().id(), original);
    assert_eq!(controller.generation().await, 1);
    assert!(dismissals(&observer).is_empty());
    assert_eq!(store.head().await, Seq::new(1));

    // AND the next relevant transition retries
    factory.set_failing(false);
    store.set_task(Some(TaskId::new("t-3"))).await;
    eventually(|| async { controller.generation().await == 2 }).await;
    assert_eq!(
        controller.current_engine().await.unwrap().planner_id(),
        &beta()
    );
    assert_eq!(factory.built(), 2);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn should_resume_from_fresh_state_after_shutdown() {
    let store = session_with(vec![intent("a")]).await;
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);

    assert!(controller.initialize().await.unwrap());
    assert!(controller.shutdown().await.unwrap());

    // Changes while stopped are not reconciled.
    store.select_planner(Some(beta())).await;
    settle().await;
    assert!(dismissals(&observer).is_empty());

    assert!(controller.initialize().await.unwrap());
    assert_eq!(controller.generation().await, 1);
    assert_eq!(controller.last_seq().await, Seq::new(1));
    assert_eq!(
        controller.current_engine().await.unwrap().planner_id(),
        &beta()
    );

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn should_resynchronise_after_lag() {
    let store = Arc::new(SessionStore::with_capacity(2));
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);
    controller.initialize().await.unwrap();

    // More commits than the channel holds, without yielding to the loop.
    for i in 0..6 {
        store
            .append(vec![Fact::note(format!("n{i}"))], AppendOptions::unconditional())
            .await
            .unwrap();
    }

    eventually(|| async { controller.last_seq().await == Seq::new(6) }).await;
    settle().await;

    assert!(observer.count(|event| matches!(event, ControllerEvent::Lagged { .. })) >= 1);
    assert_eq!(observer.passes_for_seq(Seq::new(6)).len(), 1);

    controller.shutdown().await.unwrap();
}
