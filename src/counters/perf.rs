//! `perf_event_open(2)` backend.
//!
//! Counters are opened per thread (`pid = tid`, `cpu = -1`, no group),
//! start counting immediately, never count the hypervisor, and count kernel
//! mode only when explicitly requested.

use libc::pid_t;
use std::io;
use std::os::raw::{c_int, c_ulong};
use std::os::unix::io::RawFd;
use tracing::trace;

/// Kind and configuration of a hardware event, as given to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSelector {
    pub kind: u32,
    pub config: u64,
}

/// Operations the counter manager needs from the OS.
///
/// The real implementation is `PerfBackend`; tests script their own.
pub trait CounterBackend {
    fn open(&mut self, tid: u32, event: EventSelector) -> io::Result<RawFd>;
    fn read(&mut self, fd: RawFd) -> io::Result<u64>;
    fn close(&mut self, fd: RawFd);
}

/// First published layout of `struct perf_event_attr` (`PERF_ATTR_SIZE_VER0`).
/// Newer kernels accept it and zero-extend the missing fields.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct PerfEventAttr {
    kind: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
}

const PERF_ATTR_SIZE_VER0: u32 = 64;

const ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
const ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;

const PERF_FLAG_FD_CLOEXEC: c_ulong = 1 << 3;

impl PerfEventAttr {
    fn counting(event: EventSelector, exclude_kernel: bool) -> Self {
        let mut flags = ATTR_FLAG_EXCLUDE_HV;
        if exclude_kernel {
            flags |= ATTR_FLAG_EXCLUDE_KERNEL;
        }
        Self {
            kind: event.kind,
            size: PERF_ATTR_SIZE_VER0,
            config: event.config,
            flags,
            ..Default::default()
        }
    }
}

/// # Safety
///
/// `attr` must point to a properly initialized `PerfEventAttr`.
unsafe fn perf_event_open(
    attr: *mut PerfEventAttr,
    pid: pid_t,
    cpu: c_int,
    group_fd: c_int,
    flags: c_ulong,
) -> c_int {
    unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const PerfEventAttr,
            pid,
            cpu,
            group_fd,
            flags,
        ) as c_int
    }
}

/// Counter backend using the Linux perf subsystem.
#[derive(Debug, Clone, Default)]
pub struct PerfBackend {
    count_kernel: bool,
}

impl PerfBackend {
    /// `count_kernel` includes kernel-mode events, which normally needs root.
    pub fn new(count_kernel: bool) -> Self {
        Self { count_kernel }
    }
}

impl CounterBackend for PerfBackend {
    fn open(&mut self, tid: u32, event: EventSelector) -> io::Result<RawFd> {
        let pid = pid_t::try_from(tid).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let mut attr = PerfEventAttr::counting(event, !self.count_kernel);

        // SAFETY: attr is fully initialized and outlives the call.
        let fd = unsafe { perf_event_open(&mut attr, pid, -1, -1, PERF_FLAG_FD_CLOEXEC) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            trace!(
                "perf_event_open(tid={}, type={}, config={:#x}) failed: {}",
                tid,
                event.kind,
                event.config,
                err
            );
            return Err(err);
        }
        Ok(fd)
    }

    fn read(&mut self, fd: RawFd) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        // SAFETY: buf is valid for writes of buf.len() bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if n as usize != buf.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        Ok(u64::from_ne_bytes(buf))
    }

    fn close(&mut self, fd: RawFd) {
        // SAFETY: fd was returned by perf_event_open and is closed once.
        unsafe {
            libc::close(fd);
        }
    }
}
