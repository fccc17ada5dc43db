//! Startup requirement validation for pmctop.
//!
//! This module validates that performance counters can be opened and that
//! the proc filesystem is readable before the monitor starts.

use nix::errno::Errno;
use nix::unistd::geteuid;
use pmctop::counters::events::PERF_TYPE_HARDWARE;
use pmctop::{CounterBackend, EventSelector, PerfBackend};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// `perf_event_paranoid` value at which the syscall is disabled entirely.
const PARANOID_DISABLED: i32 = 3;

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path, count_kernel: bool) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    let is_root = check_user_privileges();
    check_proc_access(proc_root)?;
    check_paranoid_level(proc_root, is_root, count_kernel)?;
    check_counter_open(count_kernel)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Logs the effective uid; returns whether it is root
fn check_user_privileges() -> bool {
    let euid = geteuid();
    if euid.is_root() {
        info!("✅ Running as root (uid=0)");
    } else {
        info!("Running as uid={} - only own tasks are monitored by default", euid);
    }
    euid.is_root()
}

/// Check that task directories can be listed
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    match fs::read_dir(proc_root) {
        Ok(_) => {
            debug!("✅ {} is readable", proc_root.display());
            Ok(())
        }
        Err(e) => {
            error!("❌ Cannot read {}: {}", proc_root.display(), e);
            Err(ValidationError::ProcUnreadable(format!(
                "{}: {}",
                proc_root.display(),
                e
            )))
        }
    }
}

pub fn parse_paranoid(content: &str) -> Option<i32> {
    content.trim().parse().ok()
}

/// Judges a `perf_event_paranoid` level for the current user.
pub fn assess_paranoid(level: i32, is_root: bool, count_kernel: bool) -> Result<(), ValidationError> {
    if level >= PARANOID_DISABLED {
        return Err(ValidationError::PerfDisabled(level));
    }
    if !is_root && level > 1 {
        warn!(
            "⚠️  perf_event_paranoid is {} - only user-space events of own tasks can be counted",
            level
        );
        warn!("   Recommendation: run as root or lower /proc/sys/kernel/perf_event_paranoid");
    }
    if count_kernel && !is_root && level > 1 {
        warn!("⚠️  Kernel-mode counting requested but not permitted at this level");
    }
    Ok(())
}

fn check_paranoid_level(
    proc_root: &Path,
    is_root: bool,
    count_kernel: bool,
) -> Result<(), ValidationError> {
    let path = proc_root.join("sys/kernel/perf_event_paranoid");
    match fs::read_to_string(&path).ok().as_deref().and_then(parse_paranoid) {
        Some(level) => {
            debug!("perf_event_paranoid = {}", level);
            let result = assess_paranoid(level, is_root, count_kernel);
            if result.is_err() {
                error!("❌ Performance counters are disabled (perf_event_paranoid = {})", level);
            }
            result
        }
        None => {
            warn!("⚠️  Could not read {}", path.display());
            Ok(()) // Continue but warn
        }
    }
}

/// Opens one cycles counter on this process
fn check_counter_open(count_kernel: bool) -> Result<(), ValidationError> {
    let mut backend = PerfBackend::new(count_kernel);
    let cycles = EventSelector {
        kind: PERF_TYPE_HARDWARE,
        // PERF_COUNT_HW_CPU_CYCLES
        config: 0,
    };
    match backend.open(std::process::id(), cycles) {
        Ok(fd) => {
            backend.close(fd);
            info!("✅ Hardware counters available");
            Ok(())
        }
        Err(e) => match e.raw_os_error().map(Errno::from_raw) {
            Some(Errno::ENOSYS) | Some(Errno::ENOENT) => {
                error!("❌ Hardware cycle counter not supported: {}", e);
                Err(ValidationError::PerfUnavailable(e.to_string()))
            }
            _ => {
                warn!("⚠️  Could not open a test counter: {}", e);
                Ok(())
            }
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Cannot read proc filesystem: {0}")]
    ProcUnreadable(String),

    #[error("Performance counters disabled (perf_event_paranoid = {0})")]
    PerfDisabled(i32),

    #[error("Performance counters unavailable: {0}")]
    PerfUnavailable(String),
}
