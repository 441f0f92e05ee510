//! # Testkit Executor
//!
//! Runs test invocations. It's the piece a test adapter calls once per test:
//! - [`TestExecutor::run_test`] - admission, parameter watching, leak verification
//! - [`TestExecutor::run_benchmark`] - exclusive, batched timing runs
//!
//! ## Quick Start
//!
//! ```text
//! use testkit_executor::{TestExecutor, TestOptions};
//!
//! let exec = TestExecutor::new(arbiter, KitConfig::default());
//! exec.run_test(
//!     &TestOptions::ordinary().with_leak_check(),
//!     || Arc::new(build_fixture()),
//!     |fixture| exercise(fixture),
//! )?;
//! ```

#![warn(missing_docs)]

mod benchmark;
mod executor;

pub use benchmark::{BatchTiming, BenchmarkOutcome, BenchmarkReport, BenchmarkSpec};
pub use executor::{TestExecutor, TestKind, TestOptions, TestReport};
