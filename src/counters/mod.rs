//! Hardware counter access.
//!
//! This module provides:
//! - `perf`: the `CounterBackend` seam and its `perf_event_open` implementation
//! - `manager`: handle acquisition, reads and the open-handle budget
//! - `events`: symbolic event type and config names

pub mod events;
pub mod manager;
pub mod perf;

pub use manager::{
    fd_budget, CounterHandle, CounterManager, DEFAULT_FD_LIMIT, FAILED_READ, FD_SAFETY_MARGIN,
};
pub use perf::{CounterBackend, EventSelector, PerfBackend};
