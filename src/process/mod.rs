//! Thread bookkeeping: discovery, per-thread records and their storage.
//!
//! This module provides:
//! - `cpu`: CPU time parsing from `/proc/<pid>/task/<tid>/stat`
//! - `record`: the per-thread record
//! - `registry`: identity-stable record storage, sorting and aggregation
//! - `scanner`: discovery of new threads

pub mod cpu;
pub mod record;
pub mod registry;
pub mod scanner;

pub use cpu::{cpu_percentages, parse_task_stat, read_task_stat, CpuTimes, TaskStat, CLK_TCK};
pub use record::{SortKey, TaskIdentity, ThreadRecord, Tid};
pub use registry::{ProcessRegistry, RecordKey, SortOrder};
pub use scanner::{OwnershipPolicy, TaskScanner};
