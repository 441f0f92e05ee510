//! Harness Scenarios
//!
//! A harness run is only useful if it tells a correct structure apart from a
//! broken one. Each worker keeps the tokens it pushed; the union of those
//! private results is compared against what the structure ended up holding.

use crate::common::*;
use rand::Rng;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use testkit::{run_from_threads, Error};

#[test]
fn test_locked_stack_keeps_every_push() {
    let stack = LockedStack::default();

    let results = harness(8, 250)
        .run(|_: Option<&u64>| {
            let token = rand::thread_rng().gen::<u64>();
            stack.push(token);
            token
        })
        .unwrap()
        .into_results()
        .unwrap();

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.len() == 250));

    let pushed = flatten(&results);
    let diff = compare(Some(pushed), Some(stack.snapshot()));
    assert!(diff.is_identical(), "lost {:?}", diff.only_in_a);
    assert_eq!(diff.in_both.len(), 2000);
}

#[test]
fn test_racy_stack_loses_pushes() {
    // Lost updates depend on scheduling; a handful of rounds makes a miss vanishingly unlikely
    let detected = (0..5).any(|_| {
        let stack = RacyStack::with_capacity(8 * 500);
        let results = harness(8, 500)
            .run(|_: Option<&u64>| {
                let token = rand::thread_rng().gen::<u64>();
                stack.push(token);
                token
            })
            .unwrap()
            .into_results()
            .unwrap();

        let diff = compare(Some(flatten(&results)), Some(stack.snapshot()));
        assert!(diff.only_in_b.is_empty(), "stack invented {:?}", diff.only_in_b);
        !diff.only_in_a.is_empty()
    });

    assert!(detected, "harness never exposed the racy push");
}

#[test]
fn test_worker_sequences_are_private() {
    let results = harness(6, 100)
        .run(|prior: Option<&(usize, u32)>| match prior {
            None => (rand::thread_rng().gen::<usize>(), 0),
            Some(&(id, n)) => (id, n + 1),
        })
        .unwrap()
        .into_results()
        .unwrap();

    for sequence in &results {
        let ids: HashSet<usize> = sequence.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), 1, "a worker saw another worker's state");
        let counts: Vec<u32> = sequence.iter().map(|(_, n)| *n).collect();
        assert_eq!(counts, (0..100).collect::<Vec<u32>>());
    }
}

#[test]
fn test_failing_assertion_surfaces_as_error() {
    let outcome = harness(4, 50)
        .run(|prior: Option<&usize>| {
            let next = prior.map_or(0, |p| p + 1);
            if next == 10 && std::thread::current().name() == Some("testkit-worker-2") {
                panic!("invariant broken at step {}", next);
            }
            next
        })
        .unwrap();

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.results[2].len(), 10);
    assert_eq!(outcome.total_results(), 3 * 50 + 10);

    match outcome.into_results() {
        Err(Error::WorkerPanicked {
            worker,
            iteration,
            message,
        }) => {
            assert_eq!(worker, 2);
            assert_eq!(iteration, 10);
            assert_eq!(message, "invariant broken at step 10");
        }
        other => panic!("expected WorkerPanicked, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_run_from_threads_reraises() {
    init_tracing();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = run_from_threads(
            |prior: Option<&u8>| {
                if prior.is_some() {
                    panic!("second call");
                }
                0u8
            },
            3,
        );
    }));

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>().copied(), Some("second call"));
}
