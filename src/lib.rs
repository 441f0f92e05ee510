//! Testkit - coordinated test execution for Rust test suites
//!
//! Testkit adds three things a plain test runner lacks:
//! - Admission control: ordinary tests share the machine, exclusive tests and
//!   benchmarks get it alone ([`ExecutionArbiter`])
//! - Leak verification: proof that a test body released every value it was
//!   handed ([`LeakVerifier`])
//! - A stochastic harness that hammers an operation from many threads and
//!   returns each thread's private results ([`StochasticHarness`])
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use testkit::{ExecutionArbiter, KitConfig, TestExecutor, TestOptions};
//!
//! // One arbiter per process, built at the composition root
//! let arbiter = Arc::new(ExecutionArbiter::new());
//! let config = KitConfig::from_file("testkit.toml".as_ref())?;
//! let exec = TestExecutor::new(arbiter, config);
//!
//! exec.run_test(
//!     &TestOptions::ordinary().with_leak_check(),
//!     || Arc::new(vec![1, 2, 3]),
//!     |values| assert_eq!(values.len(), 3),
//! )?;
//! ```
//!
//! # Architecture
//!
//! The facade re-exports four crates:
//! - `testkit-core`: errors, configuration, set comparison
//! - `testkit-concurrency`: the arbiter and the stochastic harness
//! - `testkit-leak`: watch handles and the leak verifier
//! - `testkit-executor`: the per-test invocation pipeline and benchmarks

pub use testkit_concurrency::{
    run_from_multiple_threads, run_from_threads, ArbiterStats, ExecutionArbiter, ExecutionMode,
    ExecutionPermit, HarnessOutcome, HarnessResult, StochasticHarness, WorkerFailure,
};
pub use testkit_core::{
    compare, BenchmarkConfig, Error, HarnessConfig, KitConfig, LeakConfig, PendingValue, Result,
    SetComparison, CONFIG_FILE_NAME,
};
pub use testkit_executor::{
    BatchTiming, BenchmarkOutcome, BenchmarkReport, BenchmarkSpec, TestExecutor, TestKind,
    TestOptions, TestReport,
};
pub use testkit_leak::{
    write_report, Deep, DisposalChannel, DisposeProbe, LeakVerifier, WatchHandle, WatchSink,
    Watchable, REPORT_HEADER,
};
