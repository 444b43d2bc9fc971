//! Memory locking and scheduler elevation.
//!
//! Both steps are best effort. Without `CAP_IPC_LOCK` or `CAP_SYS_NICE`
//! the monitor still runs, only with less reliable wakeups, so every
//! failure here is a warning.

use nix::errno::Errno;
use nix::sys::mman::{mlockall, MlockAllFlags};
use nix::sys::resource::{setrlimit, Resource};
use tracing::{debug, info, warn};

/// Outcome of real-time setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RealtimeStatus {
    /// Whether `RLIMIT_MEMLOCK` was raised to unlimited.
    pub memlock_unlimited: bool,
    /// Whether all pages were locked.
    pub memory_locked: bool,
    /// `SCHED_RR` priority applied, if any.
    pub rr_priority: Option<i32>,
}

/// Lock memory and raise the scheduling class as requested.
pub fn init_realtime(lock_memory: bool, set_priority: bool) -> RealtimeStatus {
    let mut status = RealtimeStatus::default();

    if lock_memory {
        status.memlock_unlimited = raise_memlock_limit();
        status.memory_locked = lock_all_pages();
    } else {
        debug!("Memory locking disabled");
    }

    if set_priority {
        status.rr_priority = set_round_robin();
    } else {
        info!("Priority elevation disabled");
    }

    info!(?status, "Real-time setup complete");
    status
}

fn raise_memlock_limit() -> bool {
    match setrlimit(Resource::RLIMIT_MEMLOCK, libc::RLIM_INFINITY, libc::RLIM_INFINITY) {
        Ok(()) => {
            debug!("RLIMIT_MEMLOCK set to unlimited");
            true
        }
        Err(e) => {
            debug!(error = %e, "Can't raise RLIMIT_MEMLOCK, using the current limit");
            false
        }
    }
}

fn lock_all_pages() -> bool {
    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            info!("Memory locked");
            true
        }
        Err(Errno::EPERM) => {
            warn!(
                "mlockall failed with EPERM, running without CAP_IPC_LOCK. \
                 Pages may be swapped out."
            );
            false
        }
        Err(e) => {
            warn!(error = %e, "mlockall failed");
            false
        }
    }
}

fn set_round_robin() -> Option<i32> {
    // SAFETY: plain query with a valid policy constant.
    let priority = unsafe { libc::sched_get_priority_max(libc::SCHED_RR) };
    if priority == -1 {
        warn!(error = %Errno::last(), "Can't get maximum SCHED_RR priority");
        return None;
    }

    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 is the calling process and `param` outlives the call.
    let res = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if res == -1 {
        let errno = Errno::last();
        if errno == Errno::EPERM {
            warn!(
                "sched_setscheduler failed with EPERM, running without CAP_SYS_NICE. \
                 Wakeups may be late."
            );
        } else {
            warn!(error = %errno, "Can't set SCHED_RR scheduler");
        }
        return None;
    }

    info!(priority, "SCHED_RR scheduler configured");
    Some(priority)
}
