//! Leak regions and the release-proof protocol
//!
//! ## Lifecycle
//!
//! ```text
//! open_region(enabled) ──► watch(value)* ──► close_region(successful_run)
//! ```
//!
//! Closing swaps the live region out under the slot lock, so a `watch`
//! racing with `close_region` either lands in the region before the swap or
//! becomes a no-op; it can never touch a set that is being drained.
//!
//! ## Draining
//!
//! Released handles are removed on every pass. Between passes the loop
//! sleeps on the region's disposal channel for at most one poll interval.
//! Verification fails once `timeout` passes without a single release.

use crate::channel::DisposalChannel;
use crate::watch::{WatchHandle, WatchSink, Watchable};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use testkit_core::{Error, LeakConfig, PendingValue, Result};
use tracing::{debug, warn};

/// First line written to stdout when a region fails.
pub const REPORT_HEADER: &str = "The following objects have not been GC'd:";

struct LeakRegion {
    handles: Vec<Box<dyn WatchHandle>>,
    channel: Arc<DisposalChannel>,
}

enum RegionSlot {
    Idle,
    Disabled,
    Open(LeakRegion),
}

/// Watches values for the duration of a region and proves their release.
///
/// One region may be open at a time. `watch` may be called from any thread
/// while the region is open.
pub struct LeakVerifier {
    slot: Mutex<RegionSlot>,
    config: LeakConfig,
}

impl Default for LeakVerifier {
    fn default() -> Self {
        Self::new(LeakConfig::default())
    }
}

impl LeakVerifier {
    /// Create a verifier with the given timing
    pub fn new(config: LeakConfig) -> Self {
        LeakVerifier {
            slot: Mutex::new(RegionSlot::Idle),
            config,
        }
    }

    /// Timing in effect
    pub fn config(&self) -> &LeakConfig {
        &self.config
    }

    /// Start a region. A disabled region turns `watch` and `close_region` into no-ops.
    ///
    /// # Errors
    ///
    /// `Usage` if an enabled region is already open.
    pub fn open_region(&self, enabled: bool) -> Result<()> {
        let mut slot = self.slot.lock();
        if let RegionSlot::Open(region) = &*slot {
            return Err(Error::usage(format!(
                "a leak region is already open with {} watched value(s)",
                region.handles.len()
            )));
        }

        *slot = if enabled {
            RegionSlot::Open(LeakRegion {
                handles: Vec::new(),
                channel: Arc::new(DisposalChannel::new()),
            })
        } else {
            RegionSlot::Disabled
        };
        debug!(target: "testkit::leak", enabled, "Region opened");
        Ok(())
    }

    /// Watch `value` (and its elements) in the open region.
    ///
    /// No-op when no enabled region is open.
    pub fn watch<W: Watchable + ?Sized>(&self, value: &W) {
        let mut slot = self.slot.lock();
        if let RegionSlot::Open(region) = &mut *slot {
            let LeakRegion { handles, channel } = region;
            WatchSink::new(handles, channel).watch(value);
        }
    }

    /// True while an enabled region is open
    pub fn is_open(&self) -> bool {
        matches!(*self.slot.lock(), RegionSlot::Open(_))
    }

    /// Handles registered in the open region, zero otherwise
    pub fn watched_count(&self) -> usize {
        match &*self.slot.lock() {
            RegionSlot::Open(region) => region.handles.len(),
            _ => 0,
        }
    }

    /// Close the region and, for a successful run, prove every watched value was released.
    ///
    /// An unsuccessful run skips verification: an early exit leaves values
    /// reachable that a completed body would have released.
    ///
    /// # Errors
    ///
    /// `LeakDetected` listing the values still reachable after the timeout.
    pub fn close_region(&self, successful_run: bool) -> Result<()> {
        let detached = std::mem::replace(&mut *self.slot.lock(), RegionSlot::Idle);

        let region = match detached {
            RegionSlot::Open(region) => region,
            RegionSlot::Idle | RegionSlot::Disabled => return Ok(()),
        };

        if !successful_run {
            debug!(
                target: "testkit::leak",
                watched = region.handles.len(),
                "Region closed after failed run; verification skipped"
            );
            return Ok(());
        }

        region.drain(&self.config)
    }
}

impl LeakRegion {
    fn drain(self, config: &LeakConfig) -> Result<()> {
        let LeakRegion {
            mut handles,
            channel,
        } = self;
        let watched = handles.len();
        let timeout = config.timeout();
        let poll = config.poll_interval();

        let mut seen = channel.events();
        let mut last_release = Instant::now();

        loop {
            let before = handles.len();
            handles.retain(|h| !h.is_released());

            if handles.is_empty() {
                debug!(target: "testkit::leak", watched, "Region verified");
                return Ok(());
            }
            if handles.len() < before {
                last_release = Instant::now();
            }

            let idle = last_release.elapsed();
            if idle >= timeout {
                handles.retain(|h| !h.is_released());
                if handles.is_empty() {
                    debug!(target: "testkit::leak", watched, "Region verified at timeout");
                    return Ok(());
                }
                return Err(leak_detected(&handles, config.timeout_ms));
            }

            seen = channel.wait_past(seen, poll.min(timeout - idle));
        }
    }
}

fn leak_detected(handles: &[Box<dyn WatchHandle>], timeout_ms: u64) -> Error {
    // Handles released since the last scan are not reported
    let pending: Vec<PendingValue> = handles
        .iter()
        .filter(|h| !h.is_released())
        .map(|h| h.describe())
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = write_report(&mut out, &pending) {
        warn!(target: "testkit::leak", error = %e, "Failed to write leak report");
    }

    warn!(
        target: "testkit::leak",
        pending = pending.len(),
        timeout_ms,
        "Watched values not released"
    );
    Error::LeakDetected {
        timeout_ms,
        pending,
    }
}

/// Write the leak report: the header line, then one line per pending value.
pub fn write_report<W: Write>(out: &mut W, pending: &[PendingValue]) -> io::Result<()> {
    writeln!(out, "{}", REPORT_HEADER)?;
    for value in pending {
        writeln!(out, "{}", value)?;
    }
    Ok(())
}
