//! Leak verification for testkit
//!
//! A [`LeakVerifier`] watches values during a test body and, when the region
//! closes, proves every one of them was released:
//! - `Arc` values are observed through `Weak` and re-scanned periodically
//! - [`DisposeProbe`]s signal the region's [`DisposalChannel`] the moment they drop
//! - Containers (`Vec`, slices, arrays, tuples, `Option`) are watched element-wise
//!
//! There is no collector to prod: a value counts as released once its last
//! strong reference is gone.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod verifier;
pub mod watch;

pub use channel::{DisposalChannel, DisposeProbe};
pub use verifier::{write_report, LeakVerifier, REPORT_HEADER};
pub use watch::{Deep, WatchHandle, WatchSink, Watchable};
