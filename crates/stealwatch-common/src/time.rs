//! Monotonic timestamps and steal-time durations.
//!
//! Both types are raw nanosecond counters from an arbitrary epoch. Only the
//! difference between two readings of the same source carries meaning, so
//! subtraction saturates at zero instead of wrapping.

use std::fmt;

/// Nanoseconds in one second.
pub const NS_PER_SEC: u64 = 1_000_000_000;
/// Nanoseconds in one millisecond.
pub const NS_PER_MSEC: u64 = 1_000_000;

/// A reading of the monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Zero timestamp, also the value reported for a failed clock read.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw nanosecond value.
    #[must_use]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Raw nanosecond value.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Seconds as a float, for display.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NS_PER_SEC as f64
    }

    /// Nanoseconds elapsed since `earlier`.
    ///
    /// Returns 0 when `earlier` is later than `self`.
    #[must_use]
    pub const fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}s", self.as_secs_f64())
    }
}

/// Cumulative CPU time stolen from this context, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StealDuration(u64);

impl StealDuration {
    /// No steal time recorded (also the fallback for a failed sample).
    pub const ZERO: Self = Self(0);

    /// Wrap a raw nanosecond value.
    #[must_use]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Convert milliseconds, saturating on overflow.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(NS_PER_MSEC))
    }

    /// Convert kernel clock ticks given the tick rate.
    ///
    /// A zero tick rate is treated as 100 Hz, the historical `USER_HZ`.
    #[must_use]
    pub const fn from_ticks(ticks: u64, ticks_per_sec: u64) -> Self {
        let rate = if ticks_per_sec == 0 { 100 } else { ticks_per_sec };
        Self(ticks.saturating_mul(NS_PER_SEC / rate))
    }

    /// Raw nanosecond value.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Seconds as a float, for display.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NS_PER_SEC as f64
    }

    /// Delta since a prior sample, or `None` if the counter went backwards.
    #[must_use]
    pub const fn checked_since(self, earlier: StealDuration) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

/// Render a nanosecond count as seconds with four decimals.
#[must_use]
pub fn format_secs(ns: u64) -> String {
    format!("{:.4}s", ns as f64 / NS_PER_SEC as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_saturating_since() {
        let a = Timestamp::from_nanos(1_000);
        let b = Timestamp::from_nanos(3_500);
        assert_eq!(b.saturating_since(a), 2_500);
        assert_eq!(a.saturating_since(b), 0);
    }

    #[test]
    fn test_steal_from_ticks() {
        // 250 ticks at 100 Hz = 2.5 s
        let steal = StealDuration::from_ticks(250, 100);
        assert_eq!(steal.as_nanos(), 2_500_000_000);

        let steal = StealDuration::from_ticks(250, 1000);
        assert_eq!(steal.as_nanos(), 250_000_000);
    }

    #[test]
    fn test_steal_from_ticks_zero_rate_falls_back() {
        assert_eq!(
            StealDuration::from_ticks(3, 0),
            StealDuration::from_ticks(3, 100)
        );
    }

    #[test]
    fn test_steal_from_millis() {
        assert_eq!(StealDuration::from_millis(30).as_nanos(), 30 * NS_PER_MSEC);
        assert_eq!(StealDuration::from_millis(u64::MAX).as_nanos(), u64::MAX);
    }

    #[test]
    fn test_steal_checked_since() {
        let prev = StealDuration::from_nanos(500);
        let now = StealDuration::from_nanos(800);
        assert_eq!(now.checked_since(prev), Some(300));
        assert_eq!(prev.checked_since(now), None);
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(250 * NS_PER_MSEC), "0.2500s");
        assert_eq!(Timestamp::from_nanos(NS_PER_SEC).to_string(), "1.0000s");
    }
}
