//! Optimistic-concurrency tests for the session store.
//!
//! Tests verify that:
//! - Exactly one of several writers racing on the same base wins
//! - A rejected append leaves no trace in the journal or the transition stream

#![allow(
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;

use parley_core::{ComposeId, Seq};
use parley_journal::{AppendOptions, Fact, FactJournal, JournalError, SessionStore};

/// Test helper: Unwrap a Result or panic with context
fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}: {}", context, e),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_writer_wins_a_race_on_the_same_base() {
    // GIVEN: A journal at head 1
    let store = SessionStore::new_arc();
    unwrap_result(
        store
            .append(vec![Fact::remote_sent("hello")], AppendOptions::unconditional())
            .await,
        "seed append should succeed",
    );
    let base = store.head().await;

    // WHEN: Eight writers append against the same observed head
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .append(
                    vec![Fact::compose_dismissed(ComposeId::new(format!("d{i}")))],
                    AppendOptions::cas(base),
                )
                .await
        }));
    }

    let mut applied = 0;
    let mut conflicts = 0;
    for handle in handles {
        match unwrap_result(handle.await, "writer task should not panic") {
            Ok(_) => applied += 1,
            Err(JournalError::CasConflict { expected, .. }) => {
                assert_eq!(expected, base);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // THEN: Exactly one append landed
    assert_eq!(applied, 1, "exactly one writer should win");
    assert_eq!(conflicts, 7, "every other writer should see a conflict");
    assert_eq!(store.head().await, Seq::new(2));
}

#[tokio::test]
async fn stale_dismissal_is_rejected_after_concurrent_append() {
    // GIVEN: facts = [compose_intent{a}], head = 1
    let store = SessionStore::new();
    unwrap_result(
        store
            .append(
                vec![Fact::ComposeIntent {
                    compose_id: ComposeId::new("a"),
                    text: "draft".to_string(),
                }],
                AppendOptions::unconditional(),
            )
            .await,
        "seed append should succeed",
    );
    let observed = store.head().await;
    assert_eq!(observed, Seq::new(1));

    // WHEN: A concurrent writer advances head to 2 before the dismissal lands
    unwrap_result(
        store
            .append(vec![Fact::remote_sent("reply")], AppendOptions::unconditional())
            .await,
        "concurrent append should succeed",
    );
    let mut sub = store.subscribe();
    let result = store
        .append(
            vec![Fact::compose_dismissed(ComposeId::new("a"))],
            AppendOptions::cas(observed),
        )
        .await;

    // THEN: The dismissal is rejected and no fact or transition is produced
    assert_eq!(
        result,
        Err(JournalError::cas_conflict(Seq::new(1), Seq::new(2)))
    );
    let facts = store.facts().await;
    assert_eq!(facts.len(), 2);
    assert!(facts
        .iter()
        .all(|fact| !matches!(fact, Fact::ComposeDismissed { .. })));
    assert!(matches!(sub.try_recv(), Ok(None)));
}
