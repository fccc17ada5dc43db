//! Per-thread record kept across refresh cycles.

use super::cpu::{cpu_percentages, CpuTimes, TaskStat};
use crate::counters::{CounterHandle, FAILED_READ};
use std::cmp::Ordering;
use std::time::Instant;

/// Kernel thread id. Equal to the process id for a process's main thread.
pub type Tid = u32;

/// Value a record is ordered by when sorting on a column.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SortKey {
    /// No value this cycle; sorts after everything else.
    #[default]
    Unset,
    Float(f64),
    Int(i64),
    /// Raw 64-bit counter value, compared exactly.
    Wide(u64),
}

impl SortKey {
    fn as_f64(self) -> Option<f64> {
        match self {
            SortKey::Unset => None,
            SortKey::Float(v) => Some(v),
            SortKey::Int(v) => Some(v as f64),
            SortKey::Wide(v) => Some(v as f64),
        }
    }

    /// Ascending order, `Unset` last regardless of direction.
    pub fn compare(&self, other: &SortKey, descending: bool) -> Ordering {
        let ord = match (self, other) {
            (SortKey::Unset, SortKey::Unset) => return Ordering::Equal,
            (SortKey::Unset, _) => return Ordering::Greater,
            (_, SortKey::Unset) => return Ordering::Less,
            (SortKey::Wide(a), SortKey::Wide(b)) => a.cmp(b),
            (SortKey::Int(a), SortKey::Int(b)) => a.cmp(b),
            (a, b) => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.total_cmp(&b)
            }
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Identity of a newly discovered task, as read from `/proc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdentity {
    pub tid: Tid,
    pub pid: Tid,
    pub uid: u32,
    pub user: String,
    pub name: String,
    pub cmdline: String,
    pub num_threads: u32,
}

/// Everything known about one thread.
#[derive(Debug)]
pub struct ThreadRecord {
    pub tid: Tid,
    pub pid: Tid,
    pub uid: u32,
    pub user: String,
    pub name: String,
    pub cmdline: String,
    pub num_threads: u32,
    pub processor: Option<u32>,

    pub cpu_percent: f64,
    pub cpu_percent_sys: f64,
    pub cpu_percent_user: f64,
    /// When CPU times were last sampled; `None` until the first sample.
    pub timestamp: Option<Instant>,
    pub prev_times: CpuTimes,

    /// Latest counter reads, one per screen counter; `FAILED_READ` on error.
    pub values: Vec<u64>,
    pub prev_values: Vec<u64>,
    /// This thread's own reads of the current cycle, before aggregation.
    pub own_values: Vec<u64>,
    pub handles: Vec<CounterHandle>,

    pub dead: bool,
    /// Not displayable this cycle.
    pub skip: bool,
    /// Some counters could not be opened.
    pub attention: bool,
    /// Highlighted by a watch filter.
    pub watched: bool,

    /// Rendered column values of the current cycle.
    pub cells: Vec<String>,
    pub sort_key: SortKey,
}

impl ThreadRecord {
    pub fn new(identity: TaskIdentity) -> Self {
        Self {
            tid: identity.tid,
            pid: identity.pid,
            uid: identity.uid,
            user: identity.user,
            name: identity.name,
            cmdline: identity.cmdline,
            num_threads: identity.num_threads,
            processor: None,
            cpu_percent: 0.0,
            cpu_percent_sys: 0.0,
            cpu_percent_user: 0.0,
            timestamp: None,
            prev_times: CpuTimes::default(),
            values: Vec::new(),
            prev_values: Vec::new(),
            own_values: Vec::new(),
            handles: Vec::new(),
            dead: false,
            skip: false,
            attention: false,
            watched: false,
            cells: Vec::new(),
            sort_key: SortKey::Unset,
        }
    }

    /// Main thread of its process.
    pub fn is_main(&self) -> bool {
        self.tid == self.pid
    }

    /// Takes ownership of the counter handles, one per screen counter.
    pub fn attach_counters(&mut self, handles: Vec<CounterHandle>) {
        self.attention = handles.iter().any(|h| !h.is_open());
        self.values = vec![0; handles.len()];
        self.prev_values = vec![0; handles.len()];
        self.own_values = vec![0; handles.len()];
        self.handles = handles;
    }

    /// Updates CPU percentages and processor from a fresh `stat` sample.
    /// The first sample only records the baseline.
    pub fn update_cpu(&mut self, stat: TaskStat, now: Instant, clk_tck: f64) {
        if let Some(last) = self.timestamp {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            let (total, sys, user) = cpu_percentages(self.prev_times, stat.times, elapsed, clk_tck);
            self.cpu_percent = total;
            self.cpu_percent_sys = sys;
            self.cpu_percent_user = user;
        }
        self.prev_times = stat.times;
        self.timestamp = Some(now);
        if stat.processor.is_some() {
            self.processor = stat.processor;
        }
    }

    /// Moves current values to previous and stores fresh reads.
    pub fn store_values(&mut self, fresh: impl IntoIterator<Item = u64>) {
        std::mem::swap(&mut self.values, &mut self.prev_values);
        self.values.clear();
        self.values.extend(fresh);
        self.own_values.clone_from(&self.values);
    }

    pub fn value_failed(&self, idx: usize) -> bool {
        self.values.get(idx).map_or(true, |v| *v == FAILED_READ)
    }
}
