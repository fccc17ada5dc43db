//! Integration tests for the refresh cycle.
//!
//! Each test builds a fake proc tree in a temporary directory and drives a
//! `Monitor` backed by a scripted counter backend.

mod common;

use common::{test_catalog, FakeProc, MockBackend, MockState, CYCLES, INSTRUCTIONS};
use pmctop::screen::RowLayout;
use pmctop::{
    CounterManager, Monitor, MonitorOptions, OwnershipPolicy, ScreenError, SortOrder, TaskScanner,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread::sleep;
use std::time::Duration;

/// Helper function to create a monitor over `fake` with a generous budget.
fn monitor(
    fake: &FakeProc,
    options: MonitorOptions,
    budget: usize,
) -> (Monitor<MockBackend>, Rc<RefCell<MockState>>) {
    let backend = MockBackend::default();
    let state = backend.state.clone();
    let counters = CounterManager::with_budget(backend, budget);
    let monitor = Monitor::new(
        test_catalog(),
        0,
        counters,
        TaskScanner::new(fake.root()),
        options,
    )
    .expect("Failed to create monitor");
    (monitor, state)
}

fn show_idle() -> MonitorOptions {
    MonitorOptions {
        idle: true,
        ..Default::default()
    }
}

/// Process 100 with threads 100 and 101, process 200 single-threaded.
fn two_processes() -> FakeProc {
    let mut fake = FakeProc::new();
    fake.add_process(100, "app", 1000, &[100, 101], b"/usr/bin/app\0--serve\0");
    fake.add_process(200, "idle", 1000, &[200], b"");
    fake
}

fn row_tids(monitor: &Monitor<MockBackend>) -> Vec<u32> {
    monitor.rows().iter().map(|r| r.tid).collect()
}

#[test]
fn test_first_cycle_discovers_all_threads() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);

    assert_eq!(monitor.run_cycle(), 0);

    assert_eq!(monitor.registry().len(), 3);
    assert_eq!(monitor.counters().open_count(), 6);
    assert_eq!(state.borrow().opened, 6);
    assert_eq!(monitor.cycles(), 1);

    let app = monitor.registry().lookup(100).expect("main thread tracked");
    assert_eq!(app.pid, 100);
    assert_eq!(app.num_threads, 2);
    assert_eq!(app.cmdline, "/usr/bin/app --serve");
    let worker = monitor.registry().lookup(101).expect("worker tracked");
    assert_eq!(worker.pid, 100);
    assert_eq!(worker.name, "app-w101");

    let idle = monitor.registry().lookup(200).expect("idle process tracked");
    assert_eq!(idle.cmdline, "[idle]");

    // per-process view hides the secondary thread
    let mut tids = row_tids(&monitor);
    tids.sort_unstable();
    assert_eq!(tids, vec![100, 200]);
}

#[test]
fn test_process_totals_and_deltas() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);

    {
        let mut s = state.borrow_mut();
        s.set(100, INSTRUCTIONS, 1000);
        s.set(101, INSTRUCTIONS, 500);
        s.set(100, CYCLES, 2000);
        s.set(101, CYCLES, 1000);
    }
    monitor.run_cycle();
    assert_eq!(monitor.registry().lookup(100).unwrap().values[0], 1500);

    {
        let mut s = state.borrow_mut();
        s.set(100, INSTRUCTIONS, 3000);
        s.set(101, INSTRUCTIONS, 1500);
        s.set(100, CYCLES, 4000);
        s.set(101, CYCLES, 2000);
    }
    monitor.run_cycle();

    let app = monitor.registry().lookup(100).unwrap();
    assert_eq!(app.values[0], 4500);
    assert_eq!(app.prev_values[0], 1500);
    assert_eq!(app.cells[1].trim(), "3000");
    assert_eq!(app.cells[2].trim(), "1.00");

    // the worker keeps its own values
    let worker = monitor.registry().lookup(101).unwrap();
    assert_eq!(worker.values[0], 1500);
}

#[test]
fn test_thread_view_stops_aggregating() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);
    state.borrow_mut().set(100, INSTRUCTIONS, 1000);
    state.borrow_mut().set(101, INSTRUCTIONS, 500);
    monitor.run_cycle();

    monitor.set_show_threads(true);
    state.borrow_mut().set(100, INSTRUCTIONS, 5000);
    state.borrow_mut().set(101, INSTRUCTIONS, 2000);
    monitor.run_cycle();

    assert_eq!(monitor.registry().lookup(100).unwrap().values[0], 5000);
    let mut tids = row_tids(&monitor);
    tids.sort_unstable();
    assert_eq!(tids, vec![100, 101, 200]);
}

fn set_insn(state: &Rc<RefCell<MockState>>, tids: &[u32], value: u64) {
    let mut s = state.borrow_mut();
    for tid in tids {
        s.set(*tid, INSTRUCTIONS, value);
    }
}

fn insn_cell(monitor: &Monitor<MockBackend>, tid: u32) -> String {
    monitor.registry().lookup(tid).unwrap().cells[1].trim().to_string()
}

#[test]
fn test_mode_switch_keeps_single_interval_deltas() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);

    // every thread retires 100 instructions per cycle
    set_insn(&state, &[100, 101], 1_000_000);
    monitor.run_cycle();
    set_insn(&state, &[100, 101], 1_000_100);
    monitor.run_cycle();
    assert_eq!(insn_cell(&monitor, 100), "200");

    monitor.set_show_threads(true);
    set_insn(&state, &[100, 101], 1_000_200);
    monitor.run_cycle();
    assert_eq!(insn_cell(&monitor, 100), "100");
    assert_eq!(insn_cell(&monitor, 101), "100");

    monitor.set_show_threads(false);
    set_insn(&state, &[100, 101], 1_000_300);
    monitor.run_cycle();
    assert_eq!(insn_cell(&monitor, 100), "200");
    assert_eq!(monitor.registry().lookup(100).unwrap().values[0], 2_000_600);

    // setting the current mode again changes nothing
    monitor.set_show_threads(false);
    set_insn(&state, &[100, 101], 1_000_400);
    monitor.run_cycle();
    assert_eq!(insn_cell(&monitor, 100), "200");
}

#[test]
fn test_cpu_usage_is_summed_per_process() {
    let fake = two_processes();
    let (mut monitor, _state) = monitor(&fake, MonitorOptions::default(), 1000);
    monitor.run_cycle();

    // nothing used CPU during the baseline cycle
    assert!(monitor.rows().is_empty());

    fake.set_times(100, 100, 50, 10, 2);
    fake.set_times(100, 101, 30, 0, 3);
    sleep(Duration::from_millis(20));
    monitor.run_cycle();

    let worker_cpu = monitor.registry().lookup(101).unwrap().cpu_percent;
    let app = monitor.registry().lookup(100).unwrap();
    assert!(worker_cpu > 0.0);
    assert!(app.cpu_percent > worker_cpu);
    assert!(app.cpu_percent_sys > 0.0);
    assert_eq!(app.processor, Some(2));

    // only the busy process passes the idle filter
    assert_eq!(row_tids(&monitor), vec![100]);
}

#[test]
fn test_failed_thread_poisons_process_counters() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);
    state.borrow_mut().refuse_open.insert(101);
    state.borrow_mut().set(100, INSTRUCTIONS, 1000);
    monitor.run_cycle();
    monitor.run_cycle();

    let worker = monitor.registry().lookup(101).unwrap();
    assert!(worker.attention);
    let app = monitor.registry().lookup(100).unwrap();
    assert!(!app.attention);
    assert!(app.value_failed(0));
    assert_eq!(app.cells[1].trim(), "?");
    // CPU is still rendered
    assert_eq!(app.cells[0].trim(), "0.0");
}

#[test]
fn test_row_markers_and_command() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);
    state.borrow_mut().refuse_open.insert(200);
    monitor.run_cycle();

    let layout = RowLayout {
        show_cmdline: true,
        ..Default::default()
    };
    let app = monitor.registry().lookup(100).unwrap();
    let line = monitor.format_row(app, &layout);
    assert!(line.starts_with("  100+"), "{:?}", line);
    assert!(line.ends_with(" /usr/bin/app --serve"), "{:?}", line);

    let idle = monitor.registry().lookup(200).unwrap();
    let line = monitor.format_row(idle, &layout);
    assert!(line.starts_with("  200*"), "{:?}", line);
    assert!(line.ends_with(" [idle]"), "{:?}", line);

    let line = monitor.format_row(idle, &RowLayout::default());
    assert!(line.ends_with(" idle"), "{:?}", line);
}

#[test]
fn test_sort_by_column_and_name() {
    let fake = two_processes();
    let options = MonitorOptions {
        sort: SortOrder::Column {
            index: 1,
            descending: true,
        },
        ..show_idle()
    };
    let (mut monitor, state) = monitor(&fake, options, 1000);
    monitor.run_cycle();
    state.borrow_mut().set(200, INSTRUCTIONS, 10);
    state.borrow_mut().set(100, INSTRUCTIONS, 9000);
    monitor.run_cycle();
    assert_eq!(row_tids(&monitor), vec![100, 200]);

    monitor.set_sort(SortOrder::Column {
        index: 1,
        descending: false,
    });
    monitor.run_cycle();
    // both deltas are zero now, ties fall back to tid
    assert_eq!(row_tids(&monitor), vec![100, 200]);

    monitor.set_sort(SortOrder::Name);
    monitor.run_cycle();
    assert_eq!(row_tids(&monitor), vec![100, 200]);
}

#[test]
fn test_exited_process_is_forgotten() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);
    monitor.run_cycle();

    fake.remove_process(200);
    assert_eq!(monitor.run_cycle(), 1);

    assert!(!monitor.registry().contains(200));
    assert_eq!(monitor.registry().len(), 2);
    assert_eq!(state.borrow().closed, 2);
    assert_eq!(monitor.counters().open_count(), 4);
}

#[test]
fn test_exited_thread_keeps_process() {
    let fake = two_processes();
    let (mut monitor, _state) = monitor(&fake, show_idle(), 1000);
    monitor.run_cycle();

    fake.remove_thread(100, 101);
    assert_eq!(monitor.run_cycle(), 1);
    assert!(monitor.registry().contains(100));
    assert!(!monitor.registry().contains(101));
}

#[test]
fn test_sticky_keeps_dead_until_purged() {
    let fake = two_processes();
    let options = MonitorOptions {
        sticky: true,
        ..show_idle()
    };
    let (mut monitor, state) = monitor(&fake, options, 1000);
    monitor.run_cycle();

    fake.remove_process(200);
    assert_eq!(monitor.run_cycle(), 1);

    let idle = monitor.registry().lookup(200).expect("dead record kept");
    assert!(idle.dead);
    assert!(!idle.handles.iter().any(|h| h.is_open()));
    assert_eq!(state.borrow().closed, 2);
    assert!(row_tids(&monitor).contains(&200));

    // a dead record is only reported once
    assert_eq!(monitor.run_cycle(), 0);

    assert_eq!(monitor.purge_dead(), 1);
    assert!(!monitor.registry().contains(200));
}

#[test]
fn test_recycled_tid_gets_new_record() {
    let mut fake = two_processes();
    let options = MonitorOptions {
        sticky: true,
        ..show_idle()
    };
    let (mut monitor, _state) = monitor(&fake, options, 1000);
    monitor.run_cycle();

    fake.remove_process(200);
    monitor.run_cycle();
    assert!(monitor.registry().lookup(200).unwrap().dead);

    fake.add_process(200, "reborn", 1000, &[200], b"/bin/reborn\0");
    monitor.run_cycle();

    let reborn = monitor.registry().lookup(200).unwrap();
    assert!(!reborn.dead);
    assert_eq!(reborn.name, "reborn");
    assert_eq!(reborn.cmdline, "/bin/reborn");
    assert!(reborn.handles.iter().all(|h| h.is_open()));
}

#[test]
fn test_new_process_found_on_later_cycle() {
    let mut fake = two_processes();
    let (mut monitor, _state) = monitor(&fake, show_idle(), 1000);
    monitor.run_cycle();
    assert_eq!(monitor.registry().len(), 3);

    fake.add_process(300, "late", 1000, &[300], b"late\0");
    monitor.run_cycle();
    assert_eq!(monitor.registry().len(), 4);
    assert!(monitor.registry().contains(300));
}

#[test]
fn test_scan_waits_for_new_pid() {
    let mut fake = two_processes();
    let (mut monitor, _state) = monitor(&fake, show_idle(), 1000);
    monitor.run_cycle();
    assert_eq!(monitor.registry().len(), 3);

    fake.add_process_quietly(300, "quiet", 1000, &[300], b"quiet\0");
    monitor.run_cycle();
    assert!(!monitor.registry().contains(300));

    fake.announce(300);
    monitor.run_cycle();
    assert!(monitor.registry().contains(300));
    assert_eq!(monitor.registry().len(), 4);
}

#[test]
fn test_only_processes_of_one_user_are_tracked() {
    let mut fake = FakeProc::new();
    fake.add_process(100, "mine", 1000, &[100, 101], b"mine\0");
    fake.add_process(200, "theirs", 2000, &[200], b"theirs\0");
    let options = MonitorOptions {
        policy: OwnershipPolicy::User(1000),
        ..show_idle()
    };
    let (mut monitor, state) = monitor(&fake, options, 1000);

    monitor.run_cycle();

    assert!(monitor.registry().contains(100));
    assert!(monitor.registry().contains(101));
    assert!(!monitor.registry().contains(200));
    assert_eq!(row_tids(&monitor), vec![100]);
    // no counters were opened for the other user's task
    assert!(state.borrow().open.values().all(|(tid, _)| *tid != 200));
}

#[test]
fn test_screen_switch_reopens_counters() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);
    monitor.run_cycle();
    assert_eq!(monitor.counters().open_count(), 6);

    monitor.set_screen(1).expect("second screen exists");
    assert_eq!(monitor.screen().name(), "insn");
    assert!(monitor.registry().is_empty());
    assert_eq!(monitor.counters().open_count(), 0);
    assert_eq!(state.borrow().closed, 6);

    monitor.run_cycle();
    assert_eq!(monitor.registry().len(), 3);
    assert_eq!(monitor.counters().open_count(), 3);
    assert_eq!(monitor.registry().lookup(100).unwrap().values.len(), 1);
}

#[test]
fn test_switch_to_missing_screen_is_refused() {
    let fake = two_processes();
    let (mut monitor, _state) = monitor(&fake, show_idle(), 1000);
    assert!(matches!(
        monitor.set_screen(7),
        Err(ScreenError::NoSuchScreen(7))
    ));
    assert_eq!(monitor.screen_index(), 0);
}

#[test]
fn test_budget_exhaustion_flags_attention() {
    let mut fake = FakeProc::new();
    fake.add_process(100, "app", 1000, &[100, 101], b"app\0");
    let (mut monitor, _state) = monitor(&fake, show_idle(), 3);
    monitor.run_cycle();

    assert_eq!(monitor.counters().open_count(), 3);
    let flagged = monitor
        .registry()
        .iter()
        .filter(|r| r.attention)
        .count();
    assert_eq!(flagged, 1);
}

#[test]
fn test_shutdown_closes_everything() {
    let fake = two_processes();
    let (mut monitor, state) = monitor(&fake, show_idle(), 1000);
    monitor.run_cycle();
    monitor.shutdown();
    assert_eq!(monitor.counters().open_count(), 0);
    assert!(state.borrow().open.is_empty());

    drop(monitor);
    assert_eq!(state.borrow().closed, 6);
}

#[test]
fn test_new_rejects_missing_screen() {
    let fake = two_processes();
    let counters = CounterManager::with_budget(MockBackend::default(), 10);
    let result = Monitor::new(
        test_catalog(),
        9,
        counters,
        TaskScanner::new(fake.root()),
        show_idle(),
    );
    assert!(matches!(result, Err(ScreenError::NoSuchScreen(9))));
}
