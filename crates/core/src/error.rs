//! Error types for testkit
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Nothing here is retried internally: every variant describes either a
//! caller bug or a verification failure, and surfaces to the test body or
//! its runner as-is.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for testkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// A watched value that was still reachable when a leak region closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingValue {
    /// Best-effort type name, `None` if the value vanished while reporting
    pub type_name: Option<String>,
    /// Debug rendering of the value
    pub value_text: String,
}

impl PendingValue {
    /// Create a pending-value record
    pub fn new(type_name: Option<String>, value_text: impl Into<String>) -> Self {
        PendingValue {
            type_name,
            value_text: value_text.into(),
        }
    }
}

impl fmt::Display for PendingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "      {}: {}",
            self.type_name.as_deref().unwrap_or("null"),
            self.value_text
        )
    }
}

/// Error types for testkit
#[derive(Debug, Error)]
pub enum Error {
    /// The caller used an API out of order or with invalid arguments
    #[error("Usage error: {reason}")]
    Usage {
        /// What was wrong
        reason: String,
    },

    /// Watched values were still reachable after the region's timeout elapsed
    #[error("Leak detected: {} watched value(s) not released within {timeout_ms}ms", pending.len())]
    LeakDetected {
        /// The wait that elapsed without any further release
        timeout_ms: u64,
        /// Values still reachable at the time of failure
        pending: Vec<PendingValue>,
    },

    /// Execution arbiter release/acquire out of balance
    #[error("Arbiter misuse: {reason}")]
    ArbiterMisuse {
        /// What was wrong
        reason: String,
    },

    /// A harness worker's job panicked
    #[error("Worker {worker} panicked on invocation {iteration}: {message}")]
    WorkerPanicked {
        /// Index of the failing worker
        worker: usize,
        /// Zero-based invocation index within that worker
        iteration: usize,
        /// Panic message, if the payload was a string
        message: String,
    },

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {reason}")]
    Config {
        /// What was wrong
        reason: String,
    },

    /// I/O error (config files, thread spawning)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a usage error
    pub fn usage(reason: impl Into<String>) -> Self {
        Error::Usage {
            reason: reason.into(),
        }
    }

    /// Create an arbiter misuse error
    pub fn arbiter_misuse(reason: impl Into<String>) -> Self {
        Error::ArbiterMisuse {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// Values reported by a leak failure, empty for every other variant
    pub fn pending_values(&self) -> &[PendingValue] {
        match self {
            Error::LeakDetected { pending, .. } => pending,
            _ => &[],
        }
    }
}
