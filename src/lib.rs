//! pmctop library
//!
//! Per-task hardware performance counter monitoring. Threads are discovered
//! under `/proc`, one counter per screen counter is opened for each of them,
//! and every refresh the screen's column expressions are evaluated against
//! the latest two samples.
//!
//! # Usage
//!
//! ```no_run
//! use pmctop::counters::{CounterManager, PerfBackend};
//! use pmctop::monitor::{Monitor, MonitorOptions};
//! use pmctop::process::TaskScanner;
//! use pmctop::screen::{RowLayout, ScreenCatalog};
//!
//! let catalog = ScreenCatalog::with_builtins();
//! let counters = CounterManager::new(PerfBackend::new(false));
//! let mut monitor = Monitor::new(
//!     catalog,
//!     0,
//!     counters,
//!     TaskScanner::new("/proc"),
//!     MonitorOptions::default(),
//! )
//! .expect("screen 0 always exists");
//!
//! monitor.run_cycle();
//! let layout = RowLayout::default();
//! println!("{}", monitor.header(&layout));
//! for row in monitor.rows() {
//!     println!("{}", monitor.format_row(row, &layout));
//! }
//! ```

pub mod counters;
pub mod expr;
pub mod monitor;
pub mod process;
pub mod screen;

// Re-export main types for convenience
pub use counters::{CounterBackend, CounterHandle, CounterManager, EventSelector, PerfBackend};
pub use expr::{EvalError, Expr, ParseError};
pub use monitor::{Monitor, MonitorOptions};
pub use process::{OwnershipPolicy, ProcessRegistry, SortOrder, TaskScanner, ThreadRecord};
pub use screen::{Screen, ScreenCatalog, ScreenDef, ScreenError};
