//! Stress Tests
//!
//! Heavy workloads. All marked #[ignore] for opt-in execution.
//! Run with: cargo test --test concurrency stress -- --ignored

use crate::common::*;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use testkit::{ExecutionMode, TestOptions};

/// Many threads, mostly ordinary tests with a steady trickle of exclusive ones
#[test]
#[ignore]
fn stress_mixed_admission() {
    let exec = Arc::new(test_executor());
    let inside = Arc::new(AtomicUsize::new(0));
    let exclusive_runs = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let exec = Arc::clone(&exec);
            let inside = Arc::clone(&inside);
            let exclusive_runs = Arc::clone(&exclusive_runs);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..500 {
                    if rng.gen_ratio(1, 20) {
                        exec.run_test(&TestOptions::exclusive(), || (), |()| {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                            exclusive_runs.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                    } else {
                        exec.run_test(&TestOptions::ordinary(), || (), |()| {
                            thread::yield_now();
                        })
                        .unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(exclusive_runs.load(Ordering::Relaxed) > 0);
    assert_eq!(exec.arbiter().stats().shared_holders, 0);
}

/// Every queued exclusive request is admitted despite constant shared load
#[test]
#[ignore]
fn stress_exclusive_latency_bound() {
    init_tracing();
    let arbiter = Arc::new(ExecutionArbiter::new());
    let deadline = Instant::now() + Duration::from_secs(3);

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let arbiter = Arc::clone(&arbiter);
            thread::spawn(move || {
                while Instant::now() < deadline {
                    let _permit = arbiter.permit(ExecutionMode::Shared).unwrap();
                    thread::sleep(Duration::from_micros(500));
                }
            })
        })
        .collect();

    let mut worst = Duration::ZERO;
    while Instant::now() < deadline {
        let start = Instant::now();
        drop(arbiter.permit(ExecutionMode::Exclusive).unwrap());
        worst = worst.max(start.elapsed());
        thread::sleep(Duration::from_millis(5));
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert!(worst < Duration::from_secs(1), "worst exclusive wait {:?}", worst);
}

/// Large harness run against the locked stack
#[test]
#[ignore]
fn stress_harness_locked_stack() {
    let stack = LockedStack::default();
    let results = harness(32, 5_000)
        .run(|_: Option<&u64>| {
            let token = rand::thread_rng().gen::<u64>();
            stack.push(token);
            token
        })
        .unwrap()
        .into_results()
        .unwrap();

    let diff = compare(Some(flatten(&results)), Some(stack.snapshot()));
    assert!(diff.is_identical());
}
