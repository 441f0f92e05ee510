//! Stochastic concurrency harness
//!
//! Runs a job from many threads at once so a test can probe whether a shared
//! structure keeps its invariants under real contention. Each worker feeds
//! the job its own previous result and keeps every result in order; workers
//! never see each other's results.
//!
//! ```text
//! spawn workers ──► start gate opens ──► job(None), job(Some(&s0)), ... ──► join
//! ```
//!
//! A worker stops after `iterations` invocations, when its time budget runs
//! out, or when its job panics. A panic never stops the other workers; the
//! first one (in time) is surfaced after every worker has joined.

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;
use testkit_core::{Error, HarnessConfig, Result};
use tracing::{debug, warn};

/// Ordered results produced by one worker.
pub type HarnessResult<S> = Vec<S>;

/// A panic captured from one job invocation.
pub struct WorkerFailure {
    /// Index of the worker whose job panicked
    pub worker: usize,
    /// Zero-based invocation index within that worker
    pub iteration: usize,
    /// Panic message, or a placeholder for non-string payloads
    pub message: String,
    payload: Box<dyn Any + Send + 'static>,
}

impl WorkerFailure {
    /// Re-raise the original panic payload unchanged.
    pub fn resume(self) -> ! {
        panic::resume_unwind(self.payload)
    }

    /// Convert to a non-unwinding error
    pub fn into_error(self) -> Error {
        Error::WorkerPanicked {
            worker: self.worker,
            iteration: self.iteration,
            message: self.message,
        }
    }
}

impl fmt::Debug for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerFailure")
            .field("worker", &self.worker)
            .field("iteration", &self.iteration)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Everything a harness run produced.
#[derive(Debug)]
pub struct HarnessOutcome<S> {
    /// One entry per worker, indexed by worker number
    pub results: Vec<HarnessResult<S>>,
    /// Captured panics, in the order they happened
    pub failures: Vec<WorkerFailure>,
}

impl<S> HarnessOutcome<S> {
    /// True when no job invocation panicked
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of results across all workers
    pub fn total_results(&self) -> usize {
        self.results.iter().map(Vec::len).sum()
    }

    /// Results, or the first failure as `Error::WorkerPanicked`.
    pub fn into_results(self) -> Result<Vec<HarnessResult<S>>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(self.results),
        }
    }

    /// Results, re-raising the first captured panic unchanged.
    pub fn resume(self) -> Vec<HarnessResult<S>> {
        if let Some(failure) = self.failures.into_iter().next() {
            failure.resume();
        }
        self.results
    }
}

// ============================================================================
// Start gate
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

/// One-shot start barrier. Unlike `std::sync::Barrier` it can be aborted, so
/// a failed spawn does not strand the workers already waiting on it.
struct StartGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl StartGate {
    fn new() -> Self {
        StartGate {
            state: Mutex::new(GateState::Closed),
            changed: Condvar::new(),
        }
    }

    /// Block until the gate leaves `Closed`; true if it opened.
    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while *state == GateState::Closed {
            self.changed.wait(&mut state);
        }
        *state == GateState::Open
    }

    fn set(&self, next: GateState) {
        let mut state = self.state.lock();
        *state = next;
        self.changed.notify_all();
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Multi-thread job driver.
#[derive(Debug, Clone, Default)]
pub struct StochasticHarness {
    config: HarnessConfig,
}

impl StochasticHarness {
    /// Create a harness with the given policy
    pub fn new(config: HarnessConfig) -> Self {
        StochasticHarness { config }
    }

    /// Override the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = Some(workers);
        self
    }

    /// Override the per-worker invocation cap
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.config.iterations = iterations;
        self
    }

    /// Number of workers a run will spawn
    pub fn worker_count(&self) -> usize {
        self.config.worker_count()
    }

    /// Policy in effect
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `job` from every worker and wait for all of them.
    ///
    /// The job receives `None` on a worker's first invocation and a borrow of
    /// that worker's previous result afterwards. It may borrow caller state:
    /// workers are scoped to this call.
    ///
    /// # Errors
    ///
    /// `Usage` for a zero worker count, iteration count or time budget, `Io` if a worker thread
    /// cannot be spawned. Job panics are reported in the outcome, not here.
    pub fn run<S, F>(&self, job: F) -> Result<HarnessOutcome<S>>
    where
        S: Send,
        F: Fn(Option<&S>) -> S + Sync,
    {
        let workers = self.worker_count();
        let iterations = self.config.iterations;
        if workers == 0 || iterations == 0 {
            return Err(Error::usage(format!(
                "harness needs at least one worker and one iteration (workers={}, iterations={})",
                workers, iterations
            )));
        }
        if self.config.time_budget_ms == 0 {
            return Err(Error::usage("harness time budget must be at least 1ms"));
        }

        let budget = self.config.time_budget();
        let gate = StartGate::new();
        let failures: Mutex<Vec<WorkerFailure>> = Mutex::new(Vec::new());

        debug!(target: "testkit::harness", workers, iterations, "Harness starting");

        let results = thread::scope(|scope| -> Result<Vec<HarnessResult<S>>> {
            let mut handles = Vec::with_capacity(workers);
            for worker in 0..workers {
                let gate = &gate;
                let failures = &failures;
                let job = &job;
                let spawned = thread::Builder::new()
                    .name(format!("testkit-worker-{}", worker))
                    .spawn_scoped(scope, move || {
                        if !gate.wait() {
                            return Vec::new();
                        }
                        let deadline = Instant::now().checked_add(budget);
                        worker_loop(worker, iterations, deadline, job, failures)
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Release the workers already parked so the scope can join them
                        gate.set(GateState::Aborted);
                        return Err(Error::Io(e));
                    }
                }
            }

            gate.set(GateState::Open);

            let mut results = Vec::with_capacity(workers);
            for (worker, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(sequence) => results.push(sequence),
                    Err(payload) => {
                        // Only reachable if the worker loop itself panicked
                        failures.lock().push(WorkerFailure {
                            worker,
                            iteration: 0,
                            message: panic_message(payload.as_ref()),
                            payload,
                        });
                        results.push(Vec::new());
                    }
                }
            }
            Ok(results)
        })?;

        let failures = failures.into_inner();
        debug!(
            target: "testkit::harness",
            workers,
            results = results.iter().map(Vec::len).sum::<usize>(),
            failures = failures.len(),
            "Harness finished"
        );

        Ok(HarnessOutcome { results, failures })
    }
}

fn worker_loop<S, F>(
    worker: usize,
    iterations: usize,
    deadline: Option<Instant>,
    job: &F,
    failures: &Mutex<Vec<WorkerFailure>>,
) -> HarnessResult<S>
where
    F: Fn(Option<&S>) -> S,
{
    let mut sequence: HarnessResult<S> = Vec::with_capacity(iterations.min(1024));

    for iteration in 0..iterations {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            break;
        }

        let prior = sequence.last();
        match panic::catch_unwind(AssertUnwindSafe(|| job(prior))) {
            Ok(next) => sequence.push(next),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(target: "testkit::harness", worker, iteration, %message, "Job panicked");
                failures.lock().push(WorkerFailure {
                    worker,
                    iteration,
                    message,
                    payload,
                });
                break;
            }
        }
    }

    sequence
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic)".to_string()
    }
}

/// Run `job` with the default policy, re-raising the first job panic.
///
/// # Errors
///
/// `Io` if a worker thread cannot be spawned.
pub fn run_from_multiple_threads<S, F>(job: F) -> Result<Vec<HarnessResult<S>>>
where
    S: Send,
    F: Fn(Option<&S>) -> S + Sync,
{
    Ok(StochasticHarness::default().run(job)?.resume())
}

/// Run `job` on exactly `workers` threads, re-raising the first job panic.
pub fn run_from_threads<S, F>(job: F, workers: usize) -> Result<Vec<HarnessResult<S>>>
where
    S: Send,
    F: Fn(Option<&S>) -> S + Sync,
{
    Ok(StochasticHarness::default()
        .with_workers(workers)
        .run(job)?
        .resume())
}
