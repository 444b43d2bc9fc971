//! Scheduling-delay measurement loop.
//!
//! Each iteration:
//! 1. Sample steal time, then the clock
//! 2. Emit an interim report if one was requested
//! 3. Wait for a third of the timeout
//! 4. Sample the clock, then steal time
//! 5. Classify the gap and update statistics
//!
//! A gap longer than the timeout means the kernel did not run us when it
//! should have. Steal time over the same interval tells whether the
//! hypervisor took the CPU away.

use crate::clock::Clock;
use crate::control::ControlFlags;
use crate::report::{ReportKind, Reporter, StatisticsReport};
use crate::steal::StealSampler;
use crate::wait::Waiter;
use std::sync::Arc;
use stealwatch_common::config::LoopConfig;
use stealwatch_common::error::{ExitStatus, MonitorResult};
use stealwatch_common::state::{LoopState, StateMachine};
use stealwatch_common::stats::RunStatistics;
use stealwatch_common::time::{format_secs, StealDuration};
use tracing::{debug, error, info, warn};

/// Classification of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The gap stayed within the timeout.
    OnTime,
    /// The gap exceeded the timeout.
    Missed,
    /// The gap exceeded the timeout and steal time exceeded the threshold.
    MissedWithSteal,
}

impl Verdict {
    /// Whether the iteration counts as a missed wakeup.
    #[must_use]
    pub fn is_missed(self) -> bool {
        !matches!(self, Self::OnTime)
    }
}

/// Measurements of a single iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    /// Clock gap around the wait, in nanoseconds.
    pub elapsed_ns: u64,
    /// Steal time accumulated over the gap, in nanoseconds.
    pub steal_elapsed_ns: u64,
    /// Steal time as a share of the gap.
    pub steal_percent: f64,
    /// Classification.
    pub verdict: Verdict,
    /// Interim report emitted at the top of this iteration.
    pub interim_report: Option<StatisticsReport>,
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Process exit status.
    pub exit_status: ExitStatus,
    /// Counters at loop exit.
    pub statistics: RunStatistics,
    /// The final report.
    pub final_report: StatisticsReport,
}

/// Steal time over `elapsed_ns` as a percentage. Zero when nothing elapsed.
#[must_use]
pub fn steal_percent(steal_elapsed_ns: u64, elapsed_ns: u64) -> f64 {
    if elapsed_ns == 0 {
        return 0.0;
    }
    steal_elapsed_ns as f64 * 100.0 / elapsed_ns as f64
}

/// Steal time between two samples.
///
/// A counter that went backwards clamps to zero. If either sample failed
/// the delta is zero as well, so this iteration is never attributed to
/// steal time.
#[must_use]
pub fn steal_delta(prev: Option<StealDuration>, now: Option<StealDuration>) -> u64 {
    let (Some(prev), Some(now)) = (prev, now) else {
        debug!(
            previous_ok = prev.is_some(),
            current_ok = now.is_some(),
            "Steal sample unavailable, skipping steal attribution"
        );
        return 0;
    };
    now.checked_since(prev).unwrap_or_else(|| {
        debug!(
            previous_ns = prev.as_nanos(),
            current_ns = now.as_nanos(),
            "Steal counter went backwards, clamping to zero"
        );
        0
    })
}

/// Classify a gap against the timeout and steal threshold.
#[must_use]
pub fn classify(
    elapsed_ns: u64,
    timeout_ns: u64,
    steal_percent: f64,
    threshold_percent: f64,
) -> Verdict {
    if elapsed_ns <= timeout_ns {
        Verdict::OnTime
    } else if steal_percent > threshold_percent {
        Verdict::MissedWithSteal
    } else {
        Verdict::Missed
    }
}

/// The measurement loop.
pub struct Monitor<C: Clock, S: StealSampler, W: Waiter> {
    config: LoopConfig,
    steal_threshold_percent: f64,
    flags: Arc<ControlFlags>,
    clock: C,
    steal: S,
    waiter: W,
    state: StateMachine,
    stats: RunStatistics,
}

impl<C: Clock, S: StealSampler, W: Waiter> Monitor<C, S, W> {
    /// Create a monitor. The run starts at the current clock reading.
    pub fn new(
        config: LoopConfig,
        steal_threshold_percent: f64,
        flags: Arc<ControlFlags>,
        mut clock: C,
        steal: S,
        waiter: W,
    ) -> Self {
        let stats = RunStatistics::new(clock.now());
        Self {
            config,
            steal_threshold_percent,
            flags,
            clock,
            steal,
            waiter,
            state: StateMachine::new(),
            stats,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state.state()
    }

    /// Counters so far.
    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Threshold in effect.
    pub fn steal_threshold_percent(&self) -> f64 {
        self.steal_threshold_percent
    }

    /// Run one iteration.
    ///
    /// # Errors
    ///
    /// Returns the wait failure. Statistics are not updated in that case.
    pub fn run_iteration(&mut self) -> MonitorResult<IterationOutcome> {
        let steal_prev = self.steal.try_sample();
        let t_prev = self.clock.now();

        let interim_report = if self.flags.take_dump_request() {
            self.stats.record_interim_report();
            Some(Reporter::report(t_prev, &self.stats, ReportKind::Interim))
        } else {
            None
        };

        let wait_budget_ms = self.config.wait_budget_ms();
        let steal_shown = steal_prev
            .map_or_else(|| String::from("unavailable"), |s| format_secs(s.as_nanos()));
        debug!(
            now = %t_prev,
            max_gap = %format_secs(self.stats.max_elapsed_ns()),
            wait_budget_ms,
            steal = %steal_shown,
            "Iteration"
        );

        self.waiter.wait(wait_budget_ms)?;

        let t_now = self.clock.now();
        let elapsed_ns = t_now.saturating_since(t_prev);
        let steal_now = self.steal.try_sample();
        let steal_elapsed_ns = steal_delta(steal_prev, steal_now);

        let percent = steal_percent(steal_elapsed_ns, elapsed_ns);
        let timeout_ns = self.config.timeout_ns();
        let verdict = classify(elapsed_ns, timeout_ns, percent, self.steal_threshold_percent);

        if verdict.is_missed() {
            error!(
                elapsed_ns,
                timeout_ms = self.config.timeout_ms(),
                steal_elapsed_ns,
                steal_percent = percent,
                "Not scheduled for {} (threshold is {}), steal time is {} ({:.2}%)",
                format_secs(elapsed_ns),
                format_secs(timeout_ns),
                format_secs(steal_elapsed_ns),
                percent
            );
        }
        if verdict == Verdict::MissedWithSteal {
            warn!(
                steal_percent = percent,
                threshold_percent = self.steal_threshold_percent,
                "Steal time is > {:.1}%, this is usually caused by an overloaded host machine",
                self.steal_threshold_percent
            );
        }

        self.stats
            .record_iteration(elapsed_ns, verdict.is_missed(), verdict == Verdict::MissedWithSteal);

        Ok(IterationOutcome {
            elapsed_ns,
            steal_elapsed_ns,
            steal_percent: percent,
            verdict,
            interim_report,
        })
    }

    /// Iterate until a stop is requested or the wait fails, then emit the
    /// final report.
    pub fn run(mut self) -> RunSummary {
        info!(
            timeout_ms = self.config.timeout_ms(),
            wait_budget_ms = self.config.wait_budget_ms(),
            steal_threshold_percent = self.steal_threshold_percent,
            "Entering main loop"
        );

        let mut exit_status = ExitStatus::Success;
        while !self.flags.stop_requested() {
            if let Err(e) = self.run_iteration() {
                error!(error = %e, "Bounded wait failed, leaving main loop");
                exit_status = ExitStatus::from(&e);
                break;
            }
        }

        self.enter(LoopState::Stopping);
        info!("Main loop stopped");

        let final_report = Reporter::report(self.clock.now(), &self.stats, ReportKind::Final);
        self.enter(LoopState::Stopped);

        RunSummary {
            exit_status,
            statistics: self.stats,
            final_report,
        }
    }

    fn enter(&mut self, target: LoopState) {
        if let Err(e) = self.state.transition(target) {
            error!(error = %e, "Loop state transition rejected");
        }
    }
}
