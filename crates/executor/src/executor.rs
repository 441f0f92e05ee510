//! The TestExecutor - single entry point for running a test invocation.
//!
//! An invocation follows one fixed sequence:
//!
//! ```text
//! 1. acquire the arbiter (shared or exclusive, from the test kind)
//! 2. for each run:
//!    a. open a leak region (enabled iff leak checking)
//!    b. build fresh parameter values and watch them
//!    c. move the values into the body
//!    d. close the region, verifying only if the body completed
//! 3. release the arbiter
//! ```
//!
//! With leak checking and a single run, an unverified priming run comes
//! first so one-time initialisation (lazy statics, thread-local caches) is
//! not mistaken for a leak.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use testkit_concurrency::{ExecutionArbiter, ExecutionMode, StochasticHarness};
use testkit_core::{Error, KitConfig, Result};
use testkit_leak::{LeakVerifier, Watchable};
use tracing::debug;

/// Declared kind of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    /// Runs alongside other ordinary tests
    Ordinary,
    /// Touches process-global state; runs alone
    Exclusive,
    /// Timing run; runs alone
    Benchmark,
}

impl TestKind {
    /// Arbiter mode this kind requires
    pub fn mode(self) -> ExecutionMode {
        match self {
            TestKind::Ordinary => ExecutionMode::Shared,
            TestKind::Exclusive | TestKind::Benchmark => ExecutionMode::Exclusive,
        }
    }
}

/// Per-test invocation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOptions {
    /// Admission class
    pub kind: TestKind,
    /// Prove every parameter value is released after each run
    pub leak_check: bool,
    /// Measured runs, each with freshly built parameters
    pub repeat: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self::ordinary()
    }
}

impl TestOptions {
    /// Single shared run without leak checking
    pub fn ordinary() -> Self {
        TestOptions {
            kind: TestKind::Ordinary,
            leak_check: false,
            repeat: 1,
        }
    }

    /// Single exclusive run without leak checking
    pub fn exclusive() -> Self {
        TestOptions {
            kind: TestKind::Exclusive,
            ..Self::ordinary()
        }
    }

    /// Enable leak checking
    pub fn with_leak_check(mut self) -> Self {
        self.leak_check = true;
        self
    }

    /// Set the number of measured runs
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }
}

/// What an invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestReport {
    /// Body executions, priming run included
    pub runs: usize,
    /// Whether an unverified priming run preceded the measured runs
    pub primed: bool,
    /// Whether measured runs were leak checked
    pub leak_checked: bool,
}

/// Runs test invocations against a shared arbiter.
///
/// The executor holds no per-test state; each invocation gets its own leak
/// verifier, so concurrent shared tests never share a region.
///
/// # Thread Safety
///
/// TestExecutor is `Send + Sync` and can be shared across threads.
pub struct TestExecutor {
    arbiter: Arc<ExecutionArbiter>,
    config: KitConfig,
}

impl TestExecutor {
    /// Create an executor over the process-wide arbiter.
    pub fn new(arbiter: Arc<ExecutionArbiter>, config: KitConfig) -> Self {
        Self { arbiter, config }
    }

    /// The arbiter invocations are admitted through
    pub fn arbiter(&self) -> &Arc<ExecutionArbiter> {
        &self.arbiter
    }

    /// Configuration in effect
    pub fn config(&self) -> &KitConfig {
        &self.config
    }

    /// A stochastic harness using the configured policy, for test bodies.
    pub fn harness(&self) -> StochasticHarness {
        StochasticHarness::new(self.config.harness.clone())
    }

    /// Run one test invocation.
    ///
    /// `params` builds the parameter values for each run; they are watched
    /// and then moved into `body`. A panicking body is re-raised unchanged
    /// after its region is closed and the arbiter released.
    ///
    /// # Errors
    ///
    /// - `Usage` if `repeat` is zero, or leak checking finds nothing to watch
    /// - `LeakDetected` if a completed run left parameter values reachable
    /// - `ArbiterMisuse` if the calling thread already holds the arbiter
    pub fn run_test<P, G, B>(
        &self,
        options: &TestOptions,
        mut params: G,
        mut body: B,
    ) -> Result<TestReport>
    where
        P: Watchable,
        G: FnMut() -> P,
        B: FnMut(P),
    {
        if options.repeat == 0 {
            return Err(Error::usage("a test must run at least once"));
        }

        let _permit = self.arbiter.permit(options.kind.mode())?;
        let verifier = LeakVerifier::new(self.config.leak.clone());
        debug!(
            target: "testkit::executor",
            kind = ?options.kind,
            leak_check = options.leak_check,
            "Invocation started"
        );

        let primed = options.leak_check && options.repeat == 1;
        if primed {
            invoke_once(&verifier, RunCheck::Prime, &mut params, &mut body)?;
        }
        let check = if options.leak_check {
            RunCheck::Verify
        } else {
            RunCheck::None
        };
        for _ in 0..options.repeat {
            invoke_once(&verifier, check, &mut params, &mut body)?;
        }

        let report = TestReport {
            runs: options.repeat + usize::from(primed),
            primed,
            leak_checked: options.leak_check,
        };
        debug!(target: "testkit::executor", runs = report.runs, "Invocation finished");
        Ok(report)
    }
}

/// Leak handling for one body execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunCheck {
    /// No region; parameters are not watched
    None,
    /// Parameters are watched so an unwatchable test fails before any body
    /// runs, but the region closes without verification
    Prime,
    /// Parameters are watched and their release verified
    Verify,
}

fn invoke_once<P, G, B>(
    verifier: &LeakVerifier,
    check: RunCheck,
    params: &mut G,
    body: &mut B,
) -> Result<()>
where
    P: Watchable,
    G: FnMut() -> P,
    B: FnMut(P),
{
    verifier.open_region(check != RunCheck::None)?;

    let values = params();
    verifier.watch(&values);

    if check != RunCheck::None && verifier.watched_count() == 0 {
        verifier.close_region(false)?;
        return Err(Error::usage(
            "leak checking requires at least one watchable parameter value",
        ));
    }

    match panic::catch_unwind(AssertUnwindSafe(|| body(values))) {
        Ok(()) => verifier.close_region(check == RunCheck::Verify),
        Err(payload) => {
            verifier.close_region(false)?;
            panic::resume_unwind(payload)
        }
    }
}
