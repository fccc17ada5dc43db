//! Task discovery under the proc filesystem.
//!
//! Walks `<root>/<pid>/task/<tid>` and registers every thread the registry
//! has not seen yet, opening one counter per screen counter for it.

use super::record::{TaskIdentity, ThreadRecord, Tid};
use super::registry::ProcessRegistry;
use crate::counters::{CounterBackend, CounterManager};
use crate::screen::Screen;
use ahash::AHashMap as HashMap;
use nix::unistd::{Uid, User};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Fields of a `status` file used for task identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub name: String,
    /// Real user id (first value of the `Uid:` line).
    pub uid: u32,
    pub threads: u32,
}

/// Parses the content of a `status` file.
pub fn parse_status(content: &str) -> Option<ProcessStatus> {
    let mut name = None;
    let mut uid = None;
    let mut threads = 1;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => name = Some(value.to_string()),
            "Uid" => uid = value.split_whitespace().next().and_then(|v| v.parse().ok()),
            "Threads" => threads = value.parse().unwrap_or(1),
            _ => {}
        }
    }
    Some(ProcessStatus {
        name: name?,
        uid: uid?,
        threads,
    })
}

pub fn read_status(dir: &Path) -> Option<ProcessStatus> {
    let content = fs::read_to_string(dir.join("status")).ok()?;
    parse_status(&content)
}

/// Turns raw `cmdline` bytes into a single line: argument separators become
/// spaces and trailing separators are dropped. `None` when nothing is left.
pub fn normalize_cmdline(raw: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .map(|c| if c == '\0' { ' ' } else { c })
        .collect();
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub fn read_cmdline(dir: &Path) -> Option<String> {
    normalize_cmdline(&fs::read(dir.join("cmdline")).ok()?)
}

/// Most recently created pid, the fifth field of `loadavg`.
pub fn read_last_pid(root: &Path) -> Option<u32> {
    let content = fs::read_to_string(root.join("loadavg")).ok()?;
    content.split_whitespace().nth(4)?.parse().ok()
}

/// Which processes the scanner descends into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipPolicy {
    #[default]
    Everyone,
    /// Only processes owned by this user id.
    User(u32),
    /// Everything except the monitor itself.
    EveryoneButSelf,
}

/// Discovers new threads and creates their records.
#[derive(Debug)]
pub struct TaskScanner {
    root: PathBuf,
    last_pid: Option<u32>,
    self_pid: u32,
    users: HashMap<u32, String>,
}

impl TaskScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_pid: None,
            self_pid: std::process::id(),
            users: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_path(&self, pid: Tid, tid: Tid) -> PathBuf {
        self.root
            .join(pid.to_string())
            .join("task")
            .join(tid.to_string())
    }

    /// Forces a full walk on the next scan.
    pub fn reset_cursor(&mut self) {
        self.last_pid = None;
    }

    /// User name for `uid`, cached. Falls back to the numeric id.
    pub fn user_name(&mut self, uid: u32) -> String {
        self.users
            .entry(uid)
            .or_insert_with(|| match User::from_uid(Uid::from_raw(uid)) {
                Ok(Some(user)) => user.name,
                _ => uid.to_string(),
            })
            .clone()
    }

    /// Registers threads not present in `registry`. Returns how many
    /// records were created. The walk is skipped when no task was created
    /// since the previous scan.
    pub fn scan<B: CounterBackend>(
        &mut self,
        registry: &mut ProcessRegistry,
        screen: &Screen,
        counters: &mut CounterManager<B>,
        policy: OwnershipPolicy,
    ) -> usize {
        let last_pid = read_last_pid(&self.root);
        if last_pid.is_some() && last_pid == self.last_pid {
            trace!("No new tasks since last scan");
            return 0;
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot read {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut created = 0;
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<Tid>().ok())
            else {
                continue;
            };
            let proc_path = entry.path();
            let Some(status) = read_status(&proc_path) else {
                trace!("Process {} vanished during scan", pid);
                continue;
            };
            if !self.wanted(pid, status.uid, policy) {
                continue;
            }
            created += self.scan_process(pid, &proc_path, &status, registry, screen, counters);
        }

        self.last_pid = last_pid;
        debug!("Scan found {} new thread(s), {} tracked", created, registry.len());
        created
    }

    fn wanted(&self, pid: Tid, uid: u32, policy: OwnershipPolicy) -> bool {
        match policy {
            OwnershipPolicy::Everyone => true,
            OwnershipPolicy::User(owner) => uid == owner,
            OwnershipPolicy::EveryoneButSelf => pid != self.self_pid,
        }
    }

    fn scan_process<B: CounterBackend>(
        &mut self,
        pid: Tid,
        proc_path: &Path,
        status: &ProcessStatus,
        registry: &mut ProcessRegistry,
        screen: &Screen,
        counters: &mut CounterManager<B>,
    ) -> usize {
        let Ok(tasks) = fs::read_dir(proc_path.join("task")) else {
            return 0;
        };

        let mut cmdline: Option<String> = None;
        let mut created = 0;
        for task in tasks.flatten() {
            let Some(tid) = task
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<Tid>().ok())
            else {
                continue;
            };
            match registry.lookup(tid).map(|r| r.dead) {
                Some(false) => continue,
                Some(true) => {
                    trace!("Thread id {} recycled, replacing dead record", tid);
                    registry.remove(tid);
                }
                None => {}
            }

            let task_path = task.path();
            let name = read_status(&task_path)
                .map(|s| s.name)
                .unwrap_or_else(|| status.name.clone());
            let cmdline = cmdline
                .get_or_insert_with(|| {
                    read_cmdline(proc_path).unwrap_or_else(|| format!("[{}]", status.name))
                })
                .clone();

            let mut record = ThreadRecord::new(TaskIdentity {
                tid,
                pid,
                uid: status.uid,
                user: self.user_name(status.uid),
                name,
                cmdline,
                num_threads: status.threads,
            });
            let handles = screen
                .counters()
                .iter()
                .map(|spec| counters.acquire(tid, spec.selector()))
                .collect();
            record.attach_counters(handles);

            if let Err(mut record) = registry.insert(record) {
                counters.release_all(&mut record.handles);
                continue;
            }
            trace!("New thread {} of process {} ({})", tid, pid, status.name);
            created += 1;
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // -------------------------------------------------------------------------
    // Tests for parse_status
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_status() {
        let content = "Name:\tnginx\nUmask:\t0022\nState:\tS (sleeping)\nUid:\t33\t33\t33\t33\nThreads:\t4\n";
        let status = parse_status(content).unwrap();
        assert_eq!(status.name, "nginx");
        assert_eq!(status.uid, 33);
        assert_eq!(status.threads, 4);
    }

    #[test]
    fn test_parse_status_requires_name_and_uid() {
        assert!(parse_status("Name:\tx\n").is_none());
        assert!(parse_status("Uid:\t0\t0\t0\t0\n").is_none());
        assert!(parse_status("").is_none());
    }

    // -------------------------------------------------------------------------
    // Tests for normalize_cmdline
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_cmdline() {
        assert_eq!(
            normalize_cmdline(b"/usr/bin/python3\0-m\0http.server\0").as_deref(),
            Some("/usr/bin/python3 -m http.server")
        );
        assert_eq!(normalize_cmdline(b"single").as_deref(), Some("single"));
    }

    #[test]
    fn test_normalize_cmdline_empty() {
        assert!(normalize_cmdline(b"").is_none());
        assert!(normalize_cmdline(b"\0\0").is_none());
    }

    #[test]
    fn test_read_last_pid() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("loadavg"), "0.52 0.58 0.59 2/613 48213\n")
            .expect("Failed to write loadavg");
        assert_eq!(read_last_pid(dir.path()), Some(48213));
        assert_eq!(read_last_pid(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_user_name_numeric_fallback() {
        let mut scanner = TaskScanner::new("/proc");
        // uid unlikely to exist in any passwd database
        assert_eq!(scanner.user_name(3_999_999_999), "3999999999");
    }

    #[test]
    fn test_task_path() {
        let scanner = TaskScanner::new("/fake");
        assert_eq!(
            scanner.task_path(10, 12),
            PathBuf::from("/fake/10/task/12")
        );
    }

    #[test]
    fn test_ownership_policy() {
        let scanner = TaskScanner::new("/proc");
        assert!(scanner.wanted(1, 0, OwnershipPolicy::Everyone));
        assert!(scanner.wanted(1, 1000, OwnershipPolicy::User(1000)));
        assert!(!scanner.wanted(1, 0, OwnershipPolicy::User(1000)));
        assert!(!scanner.wanted(std::process::id(), 0, OwnershipPolicy::EveryoneButSelf));
        assert!(scanner.wanted(1, 0, OwnershipPolicy::EveryoneButSelf));
    }
}
