//! Concurrency layer for testkit
//!
//! This crate implements the two pieces that coordinate threads:
//! - ExecutionArbiter: Shared/exclusive admission for test invocations
//! - StochasticHarness: Drives a job from many threads and collects per-worker results

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arbiter;
pub mod harness;

pub use arbiter::{ArbiterStats, ExecutionArbiter, ExecutionMode, ExecutionPermit};
pub use harness::{
    run_from_multiple_threads, run_from_threads, HarnessOutcome, HarnessResult,
    StochasticHarness, WorkerFailure,
};
