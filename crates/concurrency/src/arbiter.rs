//! Execution arbiter: shared/exclusive admission for test invocations
//!
//! Ordinary tests acquire [`ExecutionMode::Shared`] and may run side by side.
//! Benchmarks and tests that touch process-global state acquire
//! [`ExecutionMode::Exclusive`] and run alone.
//!
//! ## Policy
//!
//! ```text
//! acquire_shared:    wait while (exclusive held || exclusive waiting)
//! acquire_exclusive: waiting += 1; wait while (exclusive held || shared > 0); waiting -= 1
//! release_shared:    shared -= 1; if shared == 0 wake exclusive waiters
//! release_exclusive: clear; wake everyone
//! ```
//!
//! A pending exclusive request stops new shared admissions, so a stream of
//! overlapping ordinary tests cannot starve a benchmark. There are no
//! timeouts: a holder that never releases blocks the other mode forever.
//!
//! The logical owner of a hold is the calling thread. Permits are `!Send`
//! so they are always released on the thread that acquired them.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use testkit_core::{Error, Result};
use tracing::{debug, error};

/// Admission class of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// May run concurrently with other shared holders
    Shared,
    /// Requires sole ownership
    Exclusive,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Shared => write!(f, "shared"),
            ExecutionMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Arbiter metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterStats {
    /// Threads currently admitted in shared mode
    pub shared_holders: usize,
    /// Whether an exclusive holder is admitted
    pub exclusive_active: bool,
    /// Threads blocked in `acquire_exclusive`
    pub exclusive_waiting: usize,
}

#[derive(Default)]
struct ArbiterState {
    shared_owners: HashSet<ThreadId>,
    exclusive_owner: Option<ThreadId>,
    exclusive_waiting: usize,
}

impl ArbiterState {
    fn check_invariant(&self) {
        debug_assert!(
            self.exclusive_owner.is_none() || self.shared_owners.is_empty(),
            "exclusive holder admitted alongside {} shared holder(s)",
            self.shared_owners.len()
        );
    }
}

/// Shared/exclusive lock coordinating test invocations.
///
/// Create one per process at the composition root and share it via `Arc`.
pub struct ExecutionArbiter {
    state: Mutex<ArbiterState>,
    shared_ready: Condvar,
    exclusive_ready: Condvar,
}

impl Default for ExecutionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionArbiter {
    /// Create an arbiter with no holders.
    pub fn new() -> Self {
        ExecutionArbiter {
            state: Mutex::new(ArbiterState::default()),
            shared_ready: Condvar::new(),
            exclusive_ready: Condvar::new(),
        }
    }

    /// Block until no exclusive holder is active or waiting, then join the shared holders.
    ///
    /// # Errors
    ///
    /// `ArbiterMisuse` if the calling thread already holds either mode.
    pub fn acquire_shared(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.exclusive_owner == Some(me) {
            return Err(Error::arbiter_misuse(
                "shared acquisition requested while holding exclusive",
            ));
        }
        if state.shared_owners.contains(&me) {
            return Err(Error::arbiter_misuse("shared mode already held by this thread"));
        }

        while state.exclusive_owner.is_some() || state.exclusive_waiting > 0 {
            self.shared_ready.wait(&mut state);
        }

        state.shared_owners.insert(me);
        state.check_invariant();
        debug!(target: "testkit::arbiter", holders = state.shared_owners.len(), "Shared admitted");
        Ok(())
    }

    /// Leave the shared holders, waking exclusive waiters when the last one leaves.
    ///
    /// # Errors
    ///
    /// `ArbiterMisuse` if the calling thread does not hold shared mode.
    pub fn release_shared(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if !state.shared_owners.remove(&me) {
            return Err(Error::arbiter_misuse(
                "shared release without matching acquire",
            ));
        }

        debug!(target: "testkit::arbiter", holders = state.shared_owners.len(), "Shared released");
        if state.shared_owners.is_empty() {
            self.exclusive_ready.notify_all();
        }
        Ok(())
    }

    /// Block until there are no shared holders and no other exclusive holder.
    ///
    /// While waiting, new shared acquisitions are held back.
    ///
    /// # Errors
    ///
    /// `ArbiterMisuse` if the calling thread already holds either mode.
    pub fn acquire_exclusive(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.exclusive_owner == Some(me) {
            return Err(Error::arbiter_misuse(
                "exclusive mode already held by this thread",
            ));
        }
        if state.shared_owners.contains(&me) {
            return Err(Error::arbiter_misuse(
                "exclusive acquisition requested while holding shared",
            ));
        }

        state.exclusive_waiting += 1;
        while state.exclusive_owner.is_some() || !state.shared_owners.is_empty() {
            self.exclusive_ready.wait(&mut state);
        }
        state.exclusive_waiting -= 1;

        state.exclusive_owner = Some(me);
        state.check_invariant();
        debug!(
            target: "testkit::arbiter",
            still_waiting = state.exclusive_waiting,
            "Exclusive admitted"
        );
        Ok(())
    }

    /// Clear the exclusive hold and wake every waiter.
    ///
    /// # Errors
    ///
    /// `ArbiterMisuse` if the calling thread is not the exclusive holder.
    pub fn release_exclusive(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.exclusive_owner != Some(me) {
            return Err(Error::arbiter_misuse(
                "exclusive release by a thread that does not hold it",
            ));
        }
        state.exclusive_owner = None;
        debug!(target: "testkit::arbiter", "Exclusive released");

        // Waiting exclusives take priority; shared waiters re-check and park again.
        self.exclusive_ready.notify_all();
        self.shared_ready.notify_all();
        Ok(())
    }

    /// Acquire in the given mode.
    pub fn acquire(&self, mode: ExecutionMode) -> Result<()> {
        match mode {
            ExecutionMode::Shared => self.acquire_shared(),
            ExecutionMode::Exclusive => self.acquire_exclusive(),
        }
    }

    /// Release the given mode.
    pub fn release(&self, mode: ExecutionMode) -> Result<()> {
        match mode {
            ExecutionMode::Shared => self.release_shared(),
            ExecutionMode::Exclusive => self.release_exclusive(),
        }
    }

    /// Acquire in the given mode and return a permit that releases on drop.
    pub fn permit(&self, mode: ExecutionMode) -> Result<ExecutionPermit<'_>> {
        self.acquire(mode)?;
        Ok(ExecutionPermit {
            arbiter: self,
            mode,
            _not_send: PhantomData,
        })
    }

    /// Return a snapshot of arbiter metrics.
    pub fn stats(&self) -> ArbiterStats {
        let state = self.state.lock();
        ArbiterStats {
            shared_holders: state.shared_owners.len(),
            exclusive_active: state.exclusive_owner.is_some(),
            exclusive_waiting: state.exclusive_waiting,
        }
    }
}

/// RAII hold on an [`ExecutionArbiter`].
pub struct ExecutionPermit<'a> {
    arbiter: &'a ExecutionArbiter,
    mode: ExecutionMode,
    _not_send: PhantomData<*const ()>,
}

impl ExecutionPermit<'_> {
    /// Mode this permit holds
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

impl Drop for ExecutionPermit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.arbiter.release(self.mode) {
            error!(target: "testkit::arbiter", mode = %self.mode, error = %e, "Permit release failed");
        }
    }
}
