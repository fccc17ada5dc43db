//! CPU time parsing for thread statistics.
//!
//! This module parses `/proc/<pid>/task/<tid>/stat` and turns two samples of
//! accumulated user/kernel ticks into CPU percentages.

use once_cell::sync::Lazy;
use std::fs;
use std::io;
use std::path::Path;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Accumulated CPU time of a task, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub utime: u64,
    pub stime: u64,
}

/// Fields of a task's `stat` file used by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStat {
    pub times: CpuTimes,
    /// Processor the task last ran on (field 39), when reported.
    pub processor: Option<u32>,
}

// Field numbers from proc(5), counted from 1.
const FIELD_UTIME: usize = 14;
const FIELD_STIME: usize = 15;
const FIELD_PROCESSOR: usize = 39;
// Fields 1 and 2 (pid, comm) precede the closing parenthesis.
const FIRST_FIELD_AFTER_COMM: usize = 3;

/// Parses the content of a `stat` file. The command name may itself contain
/// spaces and parentheses, so fields are counted from the last `)`.
pub fn parse_task_stat(content: &str) -> Option<TaskStat> {
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |n: usize| fields.get(n - FIRST_FIELD_AFTER_COMM).copied();

    let utime = field(FIELD_UTIME)?.parse().ok()?;
    let stime = field(FIELD_STIME)?.parse().ok()?;
    let processor = field(FIELD_PROCESSOR).and_then(|v| v.parse().ok());

    Some(TaskStat {
        times: CpuTimes { utime, stime },
        processor,
    })
}

/// Reads and parses the `stat` file in a task directory.
pub fn read_task_stat(task_path: &Path) -> Result<TaskStat, io::Error> {
    let content = fs::read_to_string(task_path.join("stat"))?;
    parse_task_stat(&content).ok_or_else(|| io::Error::other("Invalid stat format"))
}

/// CPU usage between two samples taken `elapsed_secs` apart, as
/// `(total, system, user)` percentages. A zero interval or a counter that
/// went backwards yields zero for that component.
pub fn cpu_percentages(
    prev: CpuTimes,
    cur: CpuTimes,
    elapsed_secs: f64,
    clk_tck: f64,
) -> (f64, f64, f64) {
    if elapsed_secs <= 0.0 || clk_tck <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let percent = |ticks: u64| (ticks as f64 / clk_tck) / elapsed_secs * 100.0;
    let user = percent(cur.utime.saturating_sub(prev.utime));
    let system = percent(cur.stime.saturating_sub(prev.stime));
    (user + system, system, user)
}
