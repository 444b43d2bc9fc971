//! Bounded wait primitive.
//!
//! The loop yields to the scheduler here. `poll(2)` with no descriptors is
//! a sleep that returns early with `EINTR` when a caught signal arrives.

use nix::errno::Errno;
use stealwatch_common::error::{MonitorError, MonitorResult};
use tracing::trace;

/// How a bounded wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full budget elapsed.
    TimedOut,
    /// A signal cut the wait short.
    Interrupted,
}

/// Blocks the calling thread for at most a number of milliseconds.
pub trait Waiter {
    /// Wait up to `timeout_ms`. Zero returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Wait`] if the primitive fails for any reason
    /// other than signal interruption.
    fn wait(&mut self, timeout_ms: u64) -> MonitorResult<WaitOutcome>;
}

/// `poll(NULL, 0, timeout)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollWaiter;

impl Waiter for PollWaiter {
    fn wait(&mut self, timeout_ms: u64) -> MonitorResult<WaitOutcome> {
        let timeout = libc::c_int::try_from(timeout_ms).unwrap_or(libc::c_int::MAX);

        // SAFETY: nfds is 0, so the null descriptor array is never read.
        let res = unsafe { libc::poll(std::ptr::null_mut(), 0, timeout) };

        if res == -1 {
            let errno = Errno::last();
            if errno == Errno::EINTR {
                trace!(timeout_ms, "Wait interrupted by signal");
                return Ok(WaitOutcome::Interrupted);
            }
            return Err(MonitorError::Wait(format!("poll failed: {errno}")));
        }

        Ok(WaitOutcome::TimedOut)
    }
}
