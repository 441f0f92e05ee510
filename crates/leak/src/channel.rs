//! Disposal notification
//!
//! A [`DisposalChannel`] is an event counter plus a condvar. Anything that
//! knows the moment it is disposed of signals it; the verifier's draining
//! loop sleeps on it between scans.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Event counter that waiters can block on.
#[derive(Default)]
pub struct DisposalChannel {
    events: Mutex<u64>,
    signal: Condvar,
}

impl DisposalChannel {
    /// Create a channel with no events
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one disposal and wake every waiter.
    pub fn notify(&self) {
        let mut events = self.events.lock();
        *events += 1;
        self.signal.notify_all();
    }

    /// Disposals recorded so far
    pub fn events(&self) -> u64 {
        *self.events.lock()
    }

    /// Block until the event count moves past `seen` or `timeout` elapses.
    ///
    /// Returns the event count observed on wake-up; callers re-check their
    /// own condition since the wake may be a timeout.
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> u64 {
        let mut events = self.events.lock();
        if *events == seen {
            let _ = self.signal.wait_for(&mut events, timeout);
        }
        *events
    }
}

impl fmt::Debug for DisposalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposalChannel")
            .field("events", &self.events())
            .finish()
    }
}

pub(crate) struct ProbeState {
    pub(crate) label: String,
    pub(crate) released: AtomicBool,
    subscribers: Mutex<Vec<Weak<DisposalChannel>>>,
}

impl ProbeState {
    pub(crate) fn subscribe(&self, channel: &Arc<DisposalChannel>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| weak.strong_count() > 0);
        subscribers.push(Arc::downgrade(channel));
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Explicit ownership-release hook.
///
/// Embed a probe in a value whose disposal should be proven, and watch the
/// probe. Dropping the probe (normally together with its owner) marks it
/// released and signals every region it was watched in.
pub struct DisposeProbe {
    state: Arc<ProbeState>,
}

impl DisposeProbe {
    /// Create a probe; the label identifies it in leak reports
    pub fn new(label: impl Into<String>) -> Self {
        DisposeProbe {
            state: Arc::new(ProbeState {
                label: label.into(),
                released: AtomicBool::new(false),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Label given at construction
    pub fn label(&self) -> &str {
        &self.state.label
    }

    pub(crate) fn state(&self) -> &Arc<ProbeState> {
        &self.state
    }
}

impl Drop for DisposeProbe {
    fn drop(&mut self) {
        self.state.released.store(true, Ordering::Release);
        for channel in self.state.subscribers.lock().drain(..) {
            if let Some(channel) = channel.upgrade() {
                channel.notify();
            }
        }
    }
}

impl fmt::Debug for DisposeProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisposeProbe({:?})", self.state.label)
    }
}
