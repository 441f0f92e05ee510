//! Benchmark runs
//!
//! A benchmark is timed in batches. The first batch warms caches and the
//! allocator and is discarded; every later batch is reported as the mean
//! time of one call. Benchmarks always hold the arbiter exclusively.

use std::fmt;
use std::time::{Duration, Instant};

use testkit_concurrency::ExecutionMode;
use testkit_core::{Error, Result};
use tracing::{debug, info};

use crate::executor::TestExecutor;

/// Shape of one benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSpec {
    /// Name used in logs and the report
    pub name: String,
    /// Calls per batch
    pub iterations: usize,
    /// Reported batches (the warm-up batch is extra)
    pub batch_count: usize,
    /// Scale applied to every measured duration
    pub duration_multiplier: f64,
    /// What one call measures, e.g. "call" or "insert"
    pub units: String,
}

impl BenchmarkSpec {
    /// Benchmark with the default batch shape
    pub fn new(name: impl Into<String>) -> Self {
        BenchmarkSpec {
            name: name.into(),
            iterations: 1000,
            batch_count: 6,
            duration_multiplier: 1.0,
            units: "call".to_string(),
        }
    }

    /// Set the calls per batch
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the number of reported batches
    pub fn with_batch_count(mut self, batch_count: usize) -> Self {
        self.batch_count = batch_count;
        self
    }

    /// Scale every measured duration, e.g. to divide by inner work per call
    pub fn with_duration_multiplier(mut self, multiplier: f64) -> Self {
        self.duration_multiplier = multiplier;
        self
    }

    /// Set the unit label used in reports
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::usage(format!(
                "benchmark '{}' needs at least one iteration per batch",
                self.name
            )));
        }
        if !self.duration_multiplier.is_finite() || self.duration_multiplier <= 0.0 {
            return Err(Error::usage(format!(
                "benchmark '{}' has invalid duration multiplier {}",
                self.name, self.duration_multiplier
            )));
        }
        Ok(())
    }
}

/// Mean cost of one call in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTiming {
    /// Nanoseconds per call, after the duration multiplier
    pub per_call_ns: f64,
    /// Unit label
    pub units: String,
}

impl BatchTiming {
    fn measure(elapsed: Duration, spec: &BenchmarkSpec) -> Self {
        let scaled = elapsed.as_nanos() as f64 * spec.duration_multiplier;
        BatchTiming {
            per_call_ns: scaled / spec.iterations as f64,
            units: spec.units.clone(),
        }
    }
}

impl fmt::Display for BatchTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.per_call_ns < 1_000_000.0 {
            write!(f, "{:.2}ns per {}", self.per_call_ns, self.units)
        } else {
            write!(f, "{:.2}ms per {}", self.per_call_ns / 1_000_000.0, self.units)
        }
    }
}

/// Reported batches of a completed benchmark, warm-up excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    /// Benchmark name
    pub name: String,
    /// One timing per reported batch
    pub batches: Vec<BatchTiming>,
}

impl BenchmarkReport {
    /// Fastest reported batch
    pub fn best(&self) -> Option<&BatchTiming> {
        self.batches
            .iter()
            .min_by(|a, b| a.per_call_ns.total_cmp(&b.per_call_ns))
    }
}

/// Result of asking for a benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkOutcome {
    /// Not run; timings from this build would be meaningless
    Skipped {
        /// Why the run was skipped
        reason: String,
    },
    /// All batches ran
    Completed(BenchmarkReport),
}

impl TestExecutor {
    /// Time `op` by calling it `iterations` times per batch.
    ///
    /// # Errors
    ///
    /// - `Usage` for zero iterations or a non-positive multiplier
    /// - `ArbiterMisuse` if the calling thread already holds the arbiter
    pub fn run_benchmark<F>(&self, spec: &BenchmarkSpec, mut op: F) -> Result<BenchmarkOutcome>
    where
        F: FnMut(),
    {
        self.run_benchmark_batched(spec, |iterations| {
            for _ in 0..iterations {
                op();
            }
        })
    }

    /// Time `op` once per batch; `op` performs `iterations` units itself.
    ///
    /// Useful when per-call overhead would dominate, or when the body wants
    /// to set up state outside its own inner loop.
    pub fn run_benchmark_batched<F>(
        &self,
        spec: &BenchmarkSpec,
        mut op: F,
    ) -> Result<BenchmarkOutcome>
    where
        F: FnMut(usize),
    {
        spec.validate()?;

        if cfg!(debug_assertions) && self.config().benchmark.skip_with_debug_assertions {
            info!(target: "testkit::benchmark", name = %spec.name, "Skipped in debug build");
            return Ok(BenchmarkOutcome::Skipped {
                reason: "compiled with debug assertions".to_string(),
            });
        }

        let _permit = self.arbiter().permit(ExecutionMode::Exclusive)?;

        let mut batches = Vec::with_capacity(spec.batch_count);
        for batch in 0..=spec.batch_count {
            let start = Instant::now();
            op(spec.iterations);
            let timing = BatchTiming::measure(start.elapsed(), spec);

            if batch == 0 {
                debug!(target: "testkit::benchmark", name = %spec.name, %timing, "Warm-up batch");
                continue;
            }
            info!(target: "testkit::benchmark", name = %spec.name, batch, %timing, "Batch");
            batches.push(timing);
        }

        Ok(BenchmarkOutcome::Completed(BenchmarkReport {
            name: spec.name.clone(),
            batches,
        }))
    }
}
