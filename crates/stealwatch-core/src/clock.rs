//! Monotonic clock source.

use nix::time::{clock_gettime, ClockId};
use stealwatch_common::time::{Timestamp, NS_PER_SEC};

/// Source of monotonic timestamps.
pub trait Clock {
    /// Current timestamp. Never fails; a platform error reads as zero.
    fn now(&mut self) -> Timestamp;
}

/// `CLOCK_MONOTONIC`, unaffected by wall-clock adjustments.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&mut self) -> Timestamp {
        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => {
                let secs = u64::try_from(ts.tv_sec()).unwrap_or(0);
                let nanos = u64::try_from(ts.tv_nsec()).unwrap_or(0);
                Timestamp::from_nanos(secs.saturating_mul(NS_PER_SEC).saturating_add(nanos))
            }
            Err(_) => Timestamp::ZERO,
        }
    }
}
