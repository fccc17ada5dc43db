//! Counter handle lifecycle and the process-wide open-handle budget.

use super::perf::{CounterBackend, EventSelector};
use nix::sys::resource::{getrlimit, Resource};
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

/// Value reported for a counter whose read failed.
pub const FAILED_READ: u64 = u64::MAX;

/// Descriptors kept free for everything that is not a counter.
pub const FD_SAFETY_MARGIN: u64 = 32;

/// Soft limit assumed when `RLIMIT_NOFILE` cannot be read.
pub const DEFAULT_FD_LIMIT: u64 = 1024;

// RLIM_INFINITY should not translate into an unbounded number of opens.
const MAX_FD_BUDGET: u64 = 1 << 20;

/// Computes the handle budget from the file-descriptor soft limit.
pub fn fd_budget() -> usize {
    let soft = match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, _hard)) => soft,
        Err(e) => {
            debug!(
                "getrlimit(RLIMIT_NOFILE) failed: {}, assuming {}",
                e, DEFAULT_FD_LIMIT
            );
            DEFAULT_FD_LIMIT
        }
    };
    budget_from_limit(soft)
}

fn budget_from_limit(soft: u64) -> usize {
    let budget = soft.min(MAX_FD_BUDGET).saturating_sub(FD_SAFETY_MARGIN);
    usize::try_from(budget).unwrap_or(usize::MAX)
}

/// One counter of one thread.
///
/// Handles are not `Clone`: releasing consumes the open descriptor, so a
/// handle can only be closed once.
#[derive(Debug, PartialEq, Eq)]
pub enum CounterHandle {
    Open(RawFd),
    /// Never opened (budget exhausted or the kernel refused), or released.
    Unavailable,
}

impl CounterHandle {
    pub fn is_open(&self) -> bool {
        matches!(self, CounterHandle::Open(_))
    }
}

/// Opens, reads and closes counters while enforcing the handle budget.
pub struct CounterManager<B> {
    backend: B,
    budget: usize,
    open: usize,
    exhausted_reported: bool,
}

impl<B: CounterBackend> CounterManager<B> {
    /// Manager with a budget derived from the current `RLIMIT_NOFILE`.
    pub fn new(backend: B) -> Self {
        Self::with_budget(backend, fd_budget())
    }

    pub fn with_budget(backend: B, budget: usize) -> Self {
        debug!("Counter handle budget: {}", budget);
        Self {
            backend,
            budget,
            open: 0,
            exhausted_reported: false,
        }
    }

    /// Opens a counter for `tid`. Once the budget is spent this returns
    /// `Unavailable` without asking the backend.
    pub fn acquire(&mut self, tid: u32, event: EventSelector) -> CounterHandle {
        if self.open >= self.budget {
            if !self.exhausted_reported {
                warn!(
                    "Counter handle budget of {} exhausted, new threads will have no counters",
                    self.budget
                );
                self.exhausted_reported = true;
            }
            return CounterHandle::Unavailable;
        }

        match self.backend.open(tid, event) {
            Ok(fd) => {
                self.open += 1;
                CounterHandle::Open(fd)
            }
            Err(_) => CounterHandle::Unavailable,
        }
    }

    /// Current counter value, or `FAILED_READ`.
    pub fn read(&mut self, handle: &CounterHandle) -> u64 {
        match handle {
            CounterHandle::Open(fd) => self.backend.read(*fd).unwrap_or(FAILED_READ),
            CounterHandle::Unavailable => FAILED_READ,
        }
    }

    /// Closes the handle and leaves `Unavailable` in its place.
    pub fn release(&mut self, handle: &mut CounterHandle) {
        if let CounterHandle::Open(fd) = std::mem::replace(handle, CounterHandle::Unavailable) {
            self.backend.close(fd);
            self.open = self.open.saturating_sub(1);
        }
    }

    pub fn release_all(&mut self, handles: &mut [CounterHandle]) {
        for handle in handles {
            self.release(handle);
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn open_count(&self) -> usize {
        self.open
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
