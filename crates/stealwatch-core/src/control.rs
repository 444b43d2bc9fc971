//! Loop control flags.
//!
//! Written from signal handlers, read by the measurement loop at the top
//! of each iteration. Both flags are plain atomics so a handler can set
//! them without locking or allocating.

use std::sync::atomic::{AtomicBool, Ordering};

/// Stop and statistics-dump requests for the measurement loop.
#[derive(Debug, Default)]
pub struct ControlFlags {
    stop_requested: AtomicBool,
    dump_requested: AtomicBool,
}

impl ControlFlags {
    /// Create a flag set with nothing requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after the current iteration.
    #[inline]
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    /// Ask the loop for an interim statistics report.
    #[inline]
    pub fn request_dump(&self) {
        self.dump_requested.store(true, Ordering::Relaxed);
    }

    /// Check if a stop has been requested.
    #[inline]
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Relaxed)
    }

    /// Check if a dump has been requested (and clear the flag).
    #[inline]
    pub fn take_dump_request(&self) -> bool {
        self.dump_requested.swap(false, Ordering::Relaxed)
    }

    /// Check for a pending dump request without consuming it.
    #[inline]
    #[must_use]
    pub fn dump_pending(&self) -> bool {
        self.dump_requested.load(Ordering::Relaxed)
    }
}
