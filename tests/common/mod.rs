//! Shared fixtures for integration tests: a scripted counter backend and a
//! throwaway proc tree.

#![allow(dead_code)]

use pmctop::counters::{CounterBackend, EventSelector};
use pmctop::screen::{ColumnDef, CounterDef, CpuInfo, ScreenDef};
use pmctop::ScreenCatalog;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub const INSTRUCTIONS: u64 = 1;
pub const CYCLES: u64 = 0;

/// What the mock kernel knows. Tests keep a clone of the `Rc` and change
/// values between cycles.
#[derive(Debug, Default)]
pub struct MockState {
    /// Counter value per (tid, config).
    pub counts: HashMap<(u32, u64), u64>,
    /// Threads the kernel refuses to open counters for.
    pub refuse_open: HashSet<u32>,
    /// Threads whose reads fail.
    pub fail_read: HashSet<u32>,
    pub open: HashMap<RawFd, (u32, EventSelector)>,
    pub opened: usize,
    pub closed: usize,
    next_fd: RawFd,
}

impl MockState {
    pub fn set(&mut self, tid: u32, config: u64, value: u64) {
        self.counts.insert((tid, config), value);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub state: Rc<RefCell<MockState>>,
}

impl CounterBackend for MockBackend {
    fn open(&mut self, tid: u32, event: EventSelector) -> io::Result<RawFd> {
        let mut state = self.state.borrow_mut();
        if state.refuse_open.contains(&tid) {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        state.next_fd += 1;
        let fd = 100 + state.next_fd;
        state.open.insert(fd, (tid, event));
        state.opened += 1;
        Ok(fd)
    }

    fn read(&mut self, fd: RawFd) -> io::Result<u64> {
        let state = self.state.borrow();
        let (tid, event) = state
            .open
            .get(&fd)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))?;
        if state.fail_read.contains(&tid) {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(state.counts.get(&(tid, event.config)).copied().unwrap_or(0))
    }

    fn close(&mut self, fd: RawFd) {
        let mut state = self.state.borrow_mut();
        if state.open.remove(&fd).is_some() {
            state.closed += 1;
        }
    }
}

/// Minimal proc tree: `loadavg` plus `<pid>/{status,cmdline}` and
/// `<pid>/task/<tid>/{status,stat}`.
pub struct FakeProc {
    dir: TempDir,
    last_pid: u32,
}

impl FakeProc {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fake = Self { dir, last_pid: 0 };
        fake.write_loadavg();
        fake
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    fn write_loadavg(&self) {
        fs::write(
            self.dir.path().join("loadavg"),
            format!("0.10 0.20 0.30 1/200 {}\n", self.last_pid),
        )
        .expect("Failed to write loadavg");
    }

    fn status(name: &str, uid: u32, threads: usize) -> String {
        format!(
            "Name:\t{}\nState:\tS (sleeping)\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\nThreads:\t{}\n",
            name,
            threads,
            uid = uid
        )
    }

    fn proc_dir(&self, pid: u32) -> PathBuf {
        self.dir.path().join(pid.to_string())
    }

    fn task_dir(&self, pid: u32, tid: u32) -> PathBuf {
        self.proc_dir(pid).join("task").join(tid.to_string())
    }

    /// Creates a process with the given threads; the first tid should be
    /// `pid`. Bumps the last created pid so the next scan walks the tree.
    pub fn add_process(&mut self, pid: u32, name: &str, uid: u32, tids: &[u32], cmdline: &[u8]) {
        self.add_process_quietly(pid, name, uid, tids, cmdline);
        self.announce(tids.iter().copied().max().unwrap_or(pid));
    }

    /// Like `add_process` but leaves `loadavg` untouched, as if the
    /// directory appeared without a new pid being handed out.
    pub fn add_process_quietly(&self, pid: u32, name: &str, uid: u32, tids: &[u32], cmdline: &[u8]) {
        let dir = self.proc_dir(pid);
        fs::create_dir_all(&dir).expect("Failed to create process dir");
        fs::write(dir.join("status"), Self::status(name, uid, tids.len()))
            .expect("Failed to write status");
        fs::write(dir.join("cmdline"), cmdline).expect("Failed to write cmdline");
        for tid in tids {
            let task = self.task_dir(pid, *tid);
            fs::create_dir_all(&task).expect("Failed to create task dir");
            let thread_name = if *tid == pid {
                name.to_string()
            } else {
                format!("{}-w{}", name, tid)
            };
            fs::write(task.join("status"), Self::status(&thread_name, uid, tids.len()))
                .expect("Failed to write task status");
            self.set_times(pid, *tid, 0, 0, 0);
        }
    }

    /// Records a newly created pid in `loadavg`.
    pub fn announce(&mut self, pid: u32) {
        self.last_pid = (self.last_pid + 1).max(pid);
        self.write_loadavg();
    }

    /// Writes a task `stat` with the given CPU ticks and processor.
    pub fn set_times(&self, pid: u32, tid: u32, utime: u64, stime: u64, processor: u32) {
        // fields 4..=52
        let mut fields = vec!["0".to_string(); 49];
        fields[14 - 4] = utime.to_string();
        fields[15 - 4] = stime.to_string();
        fields[39 - 4] = processor.to_string();
        let content = format!("{} (task {}) S {}\n", tid, tid, fields.join(" "));
        fs::write(self.task_dir(pid, tid).join("stat"), content).expect("Failed to write stat");
    }

    pub fn remove_process(&self, pid: u32) {
        fs::remove_dir_all(self.proc_dir(pid)).expect("Failed to remove process dir");
    }

    pub fn remove_thread(&self, pid: u32, tid: u32) {
        fs::remove_dir_all(self.task_dir(pid, tid)).expect("Failed to remove task dir");
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Screen with an instruction and a cycle counter and three columns:
/// total CPU, instructions per interval and instructions per cycle.
pub fn ipc_screen() -> ScreenDef {
    ScreenDef {
        name: "ipc".to_string(),
        desc: Some("Instructions per cycle".to_string()),
        counters: vec![
            CounterDef::new("INSN", "PERF_TYPE_HARDWARE", "PERF_COUNT_HW_INSTRUCTIONS"),
            CounterDef::new("CYCLE", "PERF_TYPE_HARDWARE", "PERF_COUNT_HW_CPU_CYCLES"),
        ],
        columns: vec![
            ColumnDef::new(" %CPU", "%5.1f", "CPU_TOT", "CPU usage"),
            ColumnDef::new("    insn", "%8.0f", "delta(INSN)", "Instructions"),
            ColumnDef::new("  ipc", "%5.2f", "delta(INSN)/delta(CYCLE)", "IPC"),
        ],
        ..Default::default()
    }
}

/// Screen with a single instruction counter.
pub fn insn_screen() -> ScreenDef {
    ScreenDef {
        name: "insn".to_string(),
        counters: vec![CounterDef::new(
            "INSN",
            "PERF_TYPE_HARDWARE",
            "PERF_COUNT_HW_INSTRUCTIONS",
        )],
        columns: vec![ColumnDef::new("    insn", "%8.0f", "INSN", "")],
        ..Default::default()
    }
}

pub fn test_catalog() -> ScreenCatalog {
    let mut catalog = ScreenCatalog::for_cpu(CpuInfo::default());
    catalog.add_definition(&ipc_screen());
    catalog.add_definition(&insn_screen());
    catalog
}
