//! Testkit configuration via `testkit.toml`
//!
//! Every section and field is optional; an empty file yields the defaults.
//! Values are validated eagerly when loaded so a bad setting fails at
//! startup rather than halfway through a test run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name looked up by the composition root.
pub const CONFIG_FILE_NAME: &str = "testkit.toml";

/// Upper bound on the computed default worker count.
const MAX_DEFAULT_WORKERS: usize = 64;

// ============================================================================
// Harness
// ============================================================================

/// Stochastic harness policy, persisted under `[harness]`.
///
/// Each worker performs at most `iterations` invocations and stops early once
/// `time_budget_ms` has elapsed since the start gate opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Worker thread count. `None` means `2 x available parallelism`, clamped to [2, 64].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Maximum invocations per worker
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Wall-clock budget per worker in milliseconds
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
}

fn default_iterations() -> usize {
    1000
}

fn default_time_budget_ms() -> u64 {
    5000
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: None,
            iterations: default_iterations(),
            time_budget_ms: default_time_budget_ms(),
        }
    }
}

impl HarnessConfig {
    /// Resolve the worker count, applying the default policy when unset.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }

    /// Per-worker wall-clock budget
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::config("harness.workers must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(Error::config("harness.iterations must be at least 1"));
        }
        if self.time_budget_ms == 0 {
            return Err(Error::config("harness.time_budget_ms must be at least 1"));
        }
        Ok(())
    }
}

/// `2 x available parallelism`, clamped to [2, 64].
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * 2).clamp(2, MAX_DEFAULT_WORKERS)
}

// ============================================================================
// Leak verification
// ============================================================================

/// Leak verifier timing, persisted under `[leak]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeakConfig {
    /// Longest wait without any release before the region fails
    #[serde(default = "default_leak_timeout_ms")]
    pub timeout_ms: u64,
    /// Re-scan period for weakly observed values
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_leak_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_leak_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl LeakConfig {
    /// Wait without progress after which verification fails
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Re-scan period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::config("leak.timeout_ms must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("leak.poll_interval_ms must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Benchmarks
// ============================================================================

/// Benchmark policy, persisted under `[benchmark]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Skip benchmarks in builds with debug assertions, whose timings are meaningless
    #[serde(default = "default_skip_with_debug_assertions")]
    pub skip_with_debug_assertions: bool,
}

fn default_skip_with_debug_assertions() -> bool {
    true
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            skip_with_debug_assertions: default_skip_with_debug_assertions(),
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

/// Testkit configuration loaded from `testkit.toml`.
///
/// # Example
///
/// ```toml
/// [harness]
/// workers = 8
/// iterations = 1000
/// time_budget_ms = 5000
///
/// [leak]
/// timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KitConfig {
    /// Stochastic harness policy
    #[serde(default)]
    pub harness: HarnessConfig,
    /// Leak verifier timing
    #[serde(default)]
    pub leak: LeakConfig,
    /// Benchmark policy
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

impl KitConfig {
    /// Check every section's constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.harness.validate()?;
        self.leak.validate()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Testkit configuration

[harness]
# Worker threads per run (default: 2 x available parallelism, clamped to [2, 64])
# workers = 8
# Maximum invocations of the job per worker
iterations = 1000
# Wall-clock budget per worker, checked between invocations
time_budget_ms = 5000

[leak]
# Fail when no watched value has been released for this long
timeout_ms = 5000
# Re-scan period for weakly observed values
poll_interval_ms = 10

[benchmark]
# Benchmarks are skipped in builds with debug assertions
skip_with_debug_assertions = true
"#
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KitConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config { reason } => {
                Error::config(format!("{} (in '{}')", reason, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
