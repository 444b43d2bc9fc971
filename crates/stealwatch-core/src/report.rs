//! Statistics reporter.
//!
//! Builds a read-only snapshot of [`RunStatistics`] and emits it as one
//! info-level record. Interim reports are requested with `SIGUSR1`; the
//! final report is produced once when the loop stops.

use std::fmt;
use stealwatch_common::stats::RunStatistics;
use stealwatch_common::time::{Timestamp, NS_PER_SEC};
use tracing::info;

/// Name used in report text.
pub const PROGRAM_NAME: &str = "stealwatch";

/// When a report was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// On request while the loop runs.
    Interim,
    /// After the loop stopped.
    Final,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interim => write!(f, "interim"),
            Self::Final => write!(f, "final"),
        }
    }
}

/// Snapshot of the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsReport {
    /// Time since the loop started, in nanoseconds.
    pub runtime_ns: u64,
    /// Missed wakeups so far.
    pub missed_count: u64,
    /// Completed iterations.
    pub iterations: u64,
    /// Missed wakeups attributed to steal time.
    pub steal_warnings: u64,
    /// Largest gap observed, in nanoseconds.
    pub max_elapsed_ns: u64,
    /// Interim or final.
    pub kind: ReportKind,
}

impl StatisticsReport {
    /// Capture the counters as of `now`.
    #[must_use]
    pub fn capture(now: Timestamp, stats: &RunStatistics, kind: ReportKind) -> Self {
        Self {
            runtime_ns: now.saturating_since(stats.start_time()),
            missed_count: stats.missed_count(),
            iterations: stats.iterations(),
            steal_warnings: stats.steal_warnings(),
            max_elapsed_ns: stats.max_elapsed_ns(),
            kind,
        }
    }

    /// Runtime in seconds.
    #[must_use]
    pub fn runtime_secs(&self) -> f64 {
        self.runtime_ns as f64 / NS_PER_SEC as f64
    }
}

impl fmt::Display for StatisticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "During {:.4}s runtime {} was {}x not scheduled on time",
            self.runtime_secs(),
            PROGRAM_NAME,
            self.missed_count
        )
    }
}

/// Emits statistics reports to the diagnostic sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter;

impl Reporter {
    /// Capture a report as of `now`, log it at info level and return it.
    pub fn report(now: Timestamp, stats: &RunStatistics, kind: ReportKind) -> StatisticsReport {
        let report = StatisticsReport::capture(now, stats, kind);
        info!(
            kind = %report.kind,
            runtime_secs = report.runtime_secs(),
            missed = report.missed_count,
            iterations = report.iterations,
            steal_warnings = report.steal_warnings,
            max_gap_ns = report.max_elapsed_ns,
            "{report}"
        );
        report
    }
}
