//! Property: engines built = selection transitions that pass the rebuild
//! predicate, plus one for `initialize()`.
//!
//! The expected count is derived from the operations themselves, not from
//! the decision function under test.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

mod common;

use common::{alpha, beta, eventually, recorded_controller, settle, RecordingObserver};
use parley_core::{PlannerId, TaskId};
use parley_journal::{AppendOptions, AppliedConfig, Fact, FactJournal, SessionStore};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Select(Option<bool>),
    Ready(bool, bool),
    Apply(bool, String),
    Task(Option<u8>),
    Note,
}

fn planner(use_alpha: bool) -> PlannerId {
    if use_alpha {
        alpha()
    } else {
        beta()
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::option::of(any::<bool>()).prop_map(Op::Select),
        (any::<bool>(), any::<bool>()).prop_map(|(p, r)| Op::Ready(p, r)),
        (any::<bool>(), "[a-c]{0,2}").prop_map(|(p, m)| Op::Apply(p, m)),
        proptest::option::of(0u8..2).prop_map(Op::Task),
        Just(Op::Note),
    ]
}

/// Apply `ops` and return the number of rebuilds they should cause.
async fn apply_ops(store: &SessionStore, ops: &[Op]) -> u64 {
    let mut planner_id: Option<PlannerId> = None;
    let mut task_id: Option<TaskId> = None;
    let mut rebuilds = 0;

    for op in ops {
        match op {
            Op::Select(choice) => {
                let next = choice.map(planner);
                if next != planner_id {
                    rebuilds += 1;
                }
                planner_id = next.clone();
                store.select_planner(next).await;
            }
            Op::Ready(p, ready) => {
                // Every store write replaces the readiness map.
                rebuilds += 1;
                store.set_ready(planner(*p), *ready).await;
            }
            Op::Apply(p, model) => {
                rebuilds += 1;
                store
                    .apply_config(planner(*p), AppliedConfig::with_model(model.clone()))
                    .await;
            }
            Op::Task(choice) => {
                let next = choice.map(|n| TaskId::new(format!("t{n}")));
                if next != task_id {
                    rebuilds += 1;
                }
                task_id = next.clone();
                store.set_task(next).await;
            }
            Op::Note => {
                store
                    .append(vec![Fact::note("n")], AppendOptions::unconditional())
                    .await
                    .unwrap();
            }
        }
        // Keep the loop in step so the channel never lags.
        tokio::task::yield_now().await;
    }
    rebuilds
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_engine_count_matches_rebuild_predicate(ops in proptest::collection::vec(op_strategy(), 0..16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (expected, actual) = runtime.block_on(async {
            let store = SessionStore::new_arc();
            let observer = RecordingObserver::new();
            let controller = recorded_controller(&store, &observer);
            controller.initialize().await.unwrap();

            let expected = 1 + apply_ops(&store, &ops).await;
            eventually(|| async { controller.generation().await >= expected }).await;
            settle().await;

            let actual = controller.generation().await;
            controller.shutdown().await.unwrap();
            (expected, actual)
        });

        prop_assert_eq!(actual, expected);
    }
}

#[tokio::test]
async fn should_build_exactly_one_engine_on_initialize() {
    let store = SessionStore::new_arc();
    let observer = RecordingObserver::new();
    let controller = recorded_controller(&store, &observer);

    controller.initialize().await.unwrap();
    store
        .append(vec![Fact::note("n")], AppendOptions::unconditional())
        .await
        .unwrap();
    settle().await;

    assert_eq!(controller.generation().await, 1);
    assert_eq!(observer.built_engines().len(), 1);
    assert_eq!(store.facts().await.len(), 1);

    controller.shutdown().await.unwrap();
}

