//! Core types for testkit
//!
//! This crate defines the foundational pieces shared by every other crate:
//! - Error: Error type hierarchy and the `Result` alias
//! - KitConfig: `testkit.toml` configuration (harness, leak, benchmark sections)
//! - SetComparison: Three-way set difference used to verify harness results

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compare;
pub mod config;
pub mod error;

pub use compare::{compare, SetComparison};
pub use config::{BenchmarkConfig, HarnessConfig, KitConfig, LeakConfig, CONFIG_FILE_NAME};
pub use error::{Error, PendingValue, Result};
