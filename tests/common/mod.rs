//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
pub use testkit::{
    compare, ExecutionArbiter, HarnessConfig, KitConfig, LeakConfig, LeakVerifier, SetComparison,
    StochasticHarness, TestExecutor,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness' captured stdout.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Leak timing short enough for tests that expect a failure.
pub fn fast_leak_config() -> LeakConfig {
    LeakConfig {
        timeout_ms: 150,
        poll_interval_ms: 5,
    }
}

/// Executor over a fresh arbiter with fast leak timing.
pub fn test_executor() -> TestExecutor {
    init_tracing();
    let config = KitConfig {
        leak: fast_leak_config(),
        ..KitConfig::default()
    };
    TestExecutor::new(Arc::new(ExecutionArbiter::new()), config)
}

/// Harness with an explicit shape.
pub fn harness(workers: usize, iterations: usize) -> StochasticHarness {
    init_tracing();
    StochasticHarness::new(HarnessConfig {
        workers: Some(workers),
        iterations,
        time_budget_ms: 10_000,
    })
}

// ============================================================================
// Structures under test
// ============================================================================

/// Push-only stack guarded by a lock. Thread-safe.
#[derive(Default)]
pub struct LockedStack {
    items: Mutex<Vec<u64>>,
}

impl LockedStack {
    pub fn push(&self, value: u64) {
        self.items.lock().push(value);
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.items.lock().clone()
    }
}

/// Push-only stack whose slot reservation is a non-atomic read-then-write.
///
/// Two pushers that read the same length both write into one slot, so one
/// of their values is lost.
pub struct RacyStack {
    len: AtomicUsize,
    slots: Vec<Mutex<Option<u64>>>,
}

impl RacyStack {
    pub fn with_capacity(capacity: usize) -> Self {
        RacyStack {
            len: AtomicUsize::new(0),
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn push(&self, value: u64) {
        let index = self.len.load(Ordering::SeqCst);
        // Widen the window between the read and the write
        thread::yield_now();
        if index % 7 == 0 {
            thread::sleep(Duration::from_micros(50));
        }
        if let Some(slot) = self.slots.get(index) {
            *slot.lock() = Some(value);
        }
        self.len.store(index + 1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<u64> {
        let len = self.len.load(Ordering::SeqCst).min(self.slots.len());
        self.slots[..len].iter().filter_map(|slot| *slot.lock()).collect()
    }
}

/// Flatten per-worker results into one list.
pub fn flatten<T: Clone>(results: &[Vec<T>]) -> Vec<T> {
    results.iter().flat_map(|r| r.iter().cloned()).collect()
}
