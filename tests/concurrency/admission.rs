//! Admission Tests
//!
//! Shared/exclusive exclusion observed from inside the admitted sections.

use crate::common::*;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use testkit::{Error, ExecutionMode, TestOptions};

/// Counters maintained by the admitted sections themselves.
#[derive(Default)]
struct Occupancy {
    shared: AtomicUsize,
    exclusive: AtomicUsize,
    violations: AtomicUsize,
    max_shared: AtomicUsize,
}

impl Occupancy {
    fn enter(&self, mode: ExecutionMode) {
        match mode {
            ExecutionMode::Shared => {
                let now = self.shared.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_shared.fetch_max(now, Ordering::SeqCst);
                if self.exclusive.load(Ordering::SeqCst) != 0 {
                    self.violations.fetch_add(1, Ordering::SeqCst);
                }
            }
            ExecutionMode::Exclusive => {
                let prior = self.exclusive.fetch_add(1, Ordering::SeqCst);
                if prior != 0 || self.shared.load(Ordering::SeqCst) != 0 {
                    self.violations.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    fn leave(&self, mode: ExecutionMode) {
        match mode {
            ExecutionMode::Shared => self.shared.fetch_sub(1, Ordering::SeqCst),
            ExecutionMode::Exclusive => self.exclusive.fetch_sub(1, Ordering::SeqCst),
        };
    }
}

#[test]
fn test_random_modes_never_overlap() {
    init_tracing();
    let arbiter = Arc::new(ExecutionArbiter::new());
    let occupancy = Arc::new(Occupancy::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let arbiter = Arc::clone(&arbiter);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..200 {
                    let mode = if rng.gen_bool(0.2) {
                        ExecutionMode::Exclusive
                    } else {
                        ExecutionMode::Shared
                    };
                    let _permit = arbiter.permit(mode).unwrap();
                    occupancy.enter(mode);
                    if rng.gen_bool(0.1) {
                        thread::sleep(Duration::from_micros(100));
                    }
                    occupancy.leave(mode);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(occupancy.violations.load(Ordering::SeqCst), 0);
    let stats = arbiter.stats();
    assert_eq!(stats.shared_holders, 0);
    assert!(!stats.exclusive_active);
    assert_eq!(stats.exclusive_waiting, 0);
}

#[test]
fn test_ordinary_tests_run_side_by_side() {
    let exec = Arc::new(test_executor());
    let barrier = Arc::new(Barrier::new(4));
    let occupancy = Arc::new(Occupancy::default());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let exec = Arc::clone(&exec);
            let barrier = Arc::clone(&barrier);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                exec.run_test(&TestOptions::ordinary(), || (), |()| {
                    occupancy.enter(ExecutionMode::Shared);
                    // Every test is admitted before any of them finishes
                    barrier.wait();
                    occupancy.leave(ExecutionMode::Shared);
                })
                .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(occupancy.max_shared.load(Ordering::SeqCst), 4);
    assert_eq!(occupancy.violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_exclusive_test_waits_for_ordinary_tests() {
    let exec = Arc::new(test_executor());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let admitted = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let ordinary = {
        let exec = Arc::clone(&exec);
        let order = Arc::clone(&order);
        let admitted = Arc::clone(&admitted);
        let release = Arc::clone(&release);
        thread::spawn(move || {
            exec.run_test(&TestOptions::ordinary(), || (), |()| {
                admitted.wait();
                release.wait();
                order.lock().push("ordinary");
            })
            .unwrap();
        })
    };

    admitted.wait();
    let exclusive = {
        let exec = Arc::clone(&exec);
        let order = Arc::clone(&order);
        thread::spawn(move || {
            exec.run_test(&TestOptions::exclusive(), || (), |()| {
                order.lock().push("exclusive");
            })
            .unwrap();
        })
    };

    let start = Instant::now();
    while exec.arbiter().stats().exclusive_waiting == 0 {
        assert!(start.elapsed() < Duration::from_secs(5), "exclusive never queued");
        thread::sleep(Duration::from_millis(1));
    }
    release.wait();

    ordinary.join().unwrap();
    exclusive.join().unwrap();
    assert_eq!(*order.lock(), vec!["ordinary", "exclusive"]);
}

#[test]
fn test_exclusive_not_starved_by_shared_churn() {
    init_tracing();
    let arbiter = Arc::new(ExecutionArbiter::new());
    let stop = Arc::new(AtomicBool::new(false));

    // Readers overlap each other so the shared count rarely drops to zero
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let arbiter = Arc::clone(&arbiter);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut admissions = 0usize;
                while !stop.load(Ordering::SeqCst) {
                    let _permit = arbiter.permit(ExecutionMode::Shared).unwrap();
                    thread::sleep(Duration::from_micros(200));
                    admissions += 1;
                }
                admissions
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    {
        let _permit = arbiter.permit(ExecutionMode::Exclusive).unwrap();
        assert_eq!(arbiter.stats().shared_holders, 0);
    }
    let waited = start.elapsed();

    stop.store(true, Ordering::SeqCst);
    let admissions: usize = readers.into_iter().map(|h| h.join().unwrap()).sum();

    assert!(waited < Duration::from_secs(5), "exclusive waited {:?}", waited);
    assert!(admissions > 0);
}

#[test]
fn test_nested_exclusive_inside_ordinary_is_misuse() {
    let exec = test_executor();
    let mut nested = None;
    exec.run_test(&TestOptions::ordinary(), || (), |()| {
        nested = Some(exec.run_test(&TestOptions::exclusive(), || (), |()| {}));
    })
    .unwrap();

    assert!(matches!(nested, Some(Err(Error::ArbiterMisuse { .. }))));
    assert_eq!(exec.arbiter().stats().shared_holders, 0);
}
