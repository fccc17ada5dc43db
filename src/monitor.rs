//! Refresh cycle: discovery, sampling, aggregation, evaluation.

use crate::counters::{CounterBackend, CounterManager, PerfBackend, FAILED_READ};
use crate::expr::{evaluate_column, is_pseudo_metric, CounterSample, SampleSource};
use crate::process::cpu::{read_task_stat, CLK_TCK};
use crate::process::{
    OwnershipPolicy, ProcessRegistry, SortKey, SortOrder, TaskScanner, ThreadRecord, Tid,
};
use crate::screen::{
    ColumnSpec, CounterSpec, HeaderHighlight, RowLayout, Screen, ScreenCatalog, ScreenError,
    USER_WIDTH,
};
use std::time::Instant;
use tracing::{debug, trace};

/// Default minimum %CPU for a task to be shown when idle tasks are hidden.
pub const DEFAULT_CPU_THRESHOLD: f64 = 0.00001;

/// What to show and how to order it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOptions {
    /// One row per thread instead of one per process.
    pub show_threads: bool,
    /// Keep dead tasks until explicitly purged.
    pub sticky: bool,
    /// Show tasks below `cpu_threshold`.
    pub idle: bool,
    pub cpu_threshold: f64,
    pub only_pid: Option<Tid>,
    pub only_name: Option<String>,
    pub watch_pid: Option<Tid>,
    pub watch_name: Option<String>,
    pub sort: SortOrder,
    pub policy: OwnershipPolicy,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            show_threads: false,
            sticky: false,
            idle: false,
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            only_pid: None,
            only_name: None,
            watch_pid: None,
            watch_name: None,
            sort: SortOrder::default(),
            policy: OwnershipPolicy::default(),
        }
    }
}

/// Counter values of one record as seen by column expressions.
struct RecordSample<'a> {
    counters: &'a [CounterSpec],
    record: &'a ThreadRecord,
}

impl SampleSource for RecordSample<'_> {
    fn counter(&self, alias: &str) -> Option<CounterSample> {
        let idx = self.counters.iter().position(|c| c.alias == alias)?;
        let valid = |v: Option<&u64>| v.copied().filter(|v| *v != FAILED_READ);
        Some(CounterSample {
            current: valid(self.record.values.get(idx)),
            previous: valid(self.record.prev_values.get(idx)),
        })
    }

    fn cpu_total(&self) -> f64 {
        self.record.cpu_percent
    }

    fn cpu_system(&self) -> f64 {
        self.record.cpu_percent_sys
    }

    fn cpu_user(&self) -> f64 {
        self.record.cpu_percent_user
    }

    fn processor(&self) -> Option<u32> {
        self.record.processor
    }
}

/// Owns every piece of monitoring state and drives one cycle at a time.
pub struct Monitor<B: CounterBackend = PerfBackend> {
    registry: ProcessRegistry,
    scanner: TaskScanner,
    counters: CounterManager<B>,
    catalog: ScreenCatalog,
    screen: usize,
    options: MonitorOptions,
    clk_tck: f64,
    cycles: u64,
}

impl<B: CounterBackend> Monitor<B> {
    pub fn new(
        catalog: ScreenCatalog,
        screen: usize,
        counters: CounterManager<B>,
        scanner: TaskScanner,
        options: MonitorOptions,
    ) -> Result<Self, ScreenError> {
        if catalog.get(screen).is_none() {
            return Err(ScreenError::NoSuchScreen(screen));
        }
        Ok(Self {
            registry: ProcessRegistry::new(options.sticky),
            scanner,
            counters,
            catalog,
            screen,
            options,
            clk_tck: *CLK_TCK,
            cycles: 0,
        })
    }

    pub fn screen(&self) -> &Screen {
        // index validated by `new` and `set_screen`
        &self.catalog[self.screen]
    }

    pub fn screen_index(&self) -> usize {
        self.screen
    }

    pub fn catalog(&self) -> &ScreenCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn counters(&self) -> &CounterManager<B> {
        &self.counters
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one refresh cycle. Returns the number of threads found dead.
    pub fn run_cycle(&mut self) -> usize {
        let Some(screen) = self.catalog.get(self.screen) else {
            return 0;
        };

        let created = self.scanner.scan(
            &mut self.registry,
            screen,
            &mut self.counters,
            self.options.policy,
        );

        let now = Instant::now();
        let mut exited = Vec::new();
        for record in self.registry.iter_mut() {
            if record.dead {
                continue;
            }
            let task_path = self.scanner.task_path(record.pid, record.tid);
            if !task_path.join("status").exists() {
                exited.push(record.tid);
                continue;
            }
            match read_task_stat(&task_path) {
                Ok(stat) => record.update_cpu(stat, now, self.clk_tck),
                Err(e) => trace!("Thread {}: cannot read stat: {}", record.tid, e),
            }
            let counters = &mut self.counters;
            let fresh: Vec<u64> = record.handles.iter().map(|h| counters.read(h)).collect();
            record.store_values(fresh);
        }

        for tid in &exited {
            self.registry.mark_dead(*tid, &mut self.counters);
        }

        if !self.options.show_threads {
            self.registry.accumulate();
        }

        evaluate_records(&mut self.registry, screen, &self.options);

        if !exited.is_empty() && !self.options.sticky {
            self.registry.compact();
        }

        self.cycles += 1;
        debug!(
            "Cycle {}: {} new, {} exited, {} tracked, {} counters open",
            self.cycles,
            created,
            exited.len(),
            self.registry.len(),
            self.counters.open_count()
        );
        exited.len()
    }

    /// Switches between per-thread and per-process rows. Main records are
    /// re-baselined so the first delta after the switch covers a single
    /// interval of the new view.
    pub fn set_show_threads(&mut self, show_threads: bool) {
        if self.options.show_threads == show_threads {
            return;
        }
        if !show_threads {
            self.registry.reset_aggregates();
        }
        self.registry.rebaseline(!show_threads);
        self.options.show_threads = show_threads;
    }

    pub fn set_sticky(&mut self, sticky: bool) {
        self.options.sticky = sticky;
        self.registry.set_sticky(sticky);
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.options.sort = sort;
    }

    /// Activates another screen. Every counter is closed and all tasks are
    /// rediscovered on the next cycle.
    pub fn set_screen(&mut self, index: usize) -> Result<(), ScreenError> {
        if self.catalog.get(index).is_none() {
            return Err(ScreenError::NoSuchScreen(index));
        }
        self.registry.clear(&mut self.counters);
        self.scanner.reset_cursor();
        self.screen = index;
        debug!("Switched to screen {}: {}", index, self.screen().name());
        Ok(())
    }

    /// Displayable records in the configured order.
    pub fn rows(&self) -> Vec<&ThreadRecord> {
        self.registry.sorted(self.options.sort)
    }

    /// Header line matching `format_row`.
    pub fn header(&self, layout: &RowLayout) -> String {
        let highlight = match self.options.sort {
            SortOrder::Tid => HeaderHighlight::Pid,
            SortOrder::Name | SortOrder::Cmdline => HeaderHighlight::Command,
            SortOrder::Column { index, .. } if index < self.screen().columns().len() => {
                HeaderHighlight::Column(index)
            }
            SortOrder::Column { .. } => HeaderHighlight::None,
        };
        self.screen().header(layout, highlight)
    }

    /// One output line for `record`.
    pub fn format_row(&self, record: &ThreadRecord, layout: &RowLayout) -> String {
        let mut out = String::new();
        if layout.show_timestamp {
            out.push_str(&format!("{:6} ", self.cycles));
        }
        if layout.show_epoch {
            out.push_str(&format!("{:10} ", chrono::Utc::now().timestamp()));
        }

        let marker = if record.attention {
            '*'
        } else if !self.options.show_threads && record.num_threads > 1 {
            '+'
        } else {
            ' '
        };
        out.push_str(&format!("{:>5}{}", record.tid, marker));
        if layout.show_user {
            let width = USER_WIDTH - 1;
            out.push_str(&format!(" {:<width$.width$}", record.user, width = width));
        }
        for cell in &record.cells {
            out.push(' ');
            out.push_str(cell);
        }
        out.push(' ');
        out.push_str(if layout.show_cmdline {
            &record.cmdline
        } else {
            &record.name
        });
        out
    }

    /// Forgets dead tasks kept by sticky mode.
    pub fn purge_dead(&mut self) -> usize {
        self.registry.purge_dead()
    }

    /// Closes every open counter.
    pub fn shutdown(&mut self) {
        if self.counters.open_count() > 0 {
            debug!("Closing {} counter(s)", self.counters.open_count());
        }
        self.registry.release_all(&mut self.counters);
    }
}

impl<B: CounterBackend> Drop for Monitor<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Computes the display flags, cells and sort key of every record.
fn evaluate_records(registry: &mut ProcessRegistry, screen: &Screen, options: &MonitorOptions) {
    let sort_column = match options.sort {
        SortOrder::Column { index, .. } => screen.columns().get(index),
        _ => None,
    };

    for record in registry.iter_mut() {
        record.skip = !is_displayable(record, options);
        record.watched = options.watch_pid == Some(record.tid)
            || options
                .watch_name
                .as_deref()
                .map_or(false, |w| record.name.contains(w));
        record.cells.clear();
        record.sort_key = SortKey::Unset;
        if record.skip {
            continue;
        }

        let sample = RecordSample {
            counters: screen.counters(),
            record: &*record,
        };
        let cells: Vec<String> = screen
            .columns()
            .iter()
            .map(|c| c.render(evaluate_column(&c.expr, &sample)))
            .collect();
        let sort_key = sort_column.map_or(SortKey::Unset, |c| column_sort_key(c, &sample));

        record.cells = cells;
        record.sort_key = sort_key;
    }
}

fn is_displayable(record: &ThreadRecord, options: &MonitorOptions) -> bool {
    if record.dead && !options.sticky {
        return false;
    }
    if !options.show_threads && !record.is_main() {
        return false;
    }
    if !options.idle && record.cpu_percent < options.cpu_threshold {
        return false;
    }
    if let Some(pid) = options.only_pid {
        if record.tid != pid && record.pid != pid {
            return false;
        }
    }
    if let Some(name) = options.only_name.as_deref() {
        if !record.name.contains(name) {
            return false;
        }
    }
    true
}

/// Sort key of one column. A bare counter column sorts on the exact
/// 64-bit value; everything else on the evaluated float.
fn column_sort_key(column: &ColumnSpec, sample: &RecordSample<'_>) -> SortKey {
    if let Some(alias) = column.expr.as_plain_ref() {
        if !is_pseudo_metric(alias) {
            return sample
                .counter(alias)
                .and_then(|s| s.current)
                .map_or(SortKey::Unset, SortKey::Wide);
        }
    }
    match evaluate_column(&column.expr, sample) {
        Ok(v) => SortKey::Float(v),
        Err(_) => SortKey::Unset,
    }
}
