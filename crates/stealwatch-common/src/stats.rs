//! Cumulative run statistics.
//!
//! Owned by the measurement loop. All counters only grow; the reporter
//! works from a shared reference and never mutates.

use crate::time::Timestamp;

/// Process-lifetime counters of the measurement loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    /// Clock reading when the loop started.
    start_time: Timestamp,
    /// Iterations whose gap exceeded the timeout.
    missed_count: u64,
    /// Completed iterations.
    iterations: u64,
    /// Missed wakeups that were also attributed to steal time.
    steal_warnings: u64,
    /// Largest gap observed, in nanoseconds.
    max_elapsed_ns: u64,
    /// Interim reports produced on request.
    interim_reports: u64,
}

impl RunStatistics {
    /// Start counting from `start_time`.
    #[must_use]
    pub fn new(start_time: Timestamp) -> Self {
        Self {
            start_time,
            missed_count: 0,
            iterations: 0,
            steal_warnings: 0,
            max_elapsed_ns: 0,
            interim_reports: 0,
        }
    }

    /// Record one completed iteration.
    ///
    /// `missed` and `steal_attributed` come from the iteration classifier;
    /// `steal_attributed` is only counted together with `missed`.
    pub fn record_iteration(&mut self, elapsed_ns: u64, missed: bool, steal_attributed: bool) {
        self.iterations += 1;
        self.max_elapsed_ns = self.max_elapsed_ns.max(elapsed_ns);
        if missed {
            self.missed_count += 1;
            if steal_attributed {
                self.steal_warnings += 1;
            }
        }
    }

    /// Record an interim report.
    pub fn record_interim_report(&mut self) {
        self.interim_reports += 1;
    }

    /// Loop start timestamp.
    #[must_use]
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Times the process was not scheduled on time.
    #[must_use]
    pub fn missed_count(&self) -> u64 {
        self.missed_count
    }

    /// Completed iterations.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Missed wakeups blamed on host steal time.
    #[must_use]
    pub fn steal_warnings(&self) -> u64 {
        self.steal_warnings
    }

    /// Largest observed gap in nanoseconds.
    #[must_use]
    pub fn max_elapsed_ns(&self) -> u64 {
        self.max_elapsed_ns
    }

    /// Interim reports emitted so far.
    #[must_use]
    pub fn interim_reports(&self) -> u64 {
        self.interim_reports
    }
}
