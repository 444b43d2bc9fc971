//! Measurement loop scenarios.

use super::common::{scenario, StopAfter};
use std::sync::Arc;
use stealwatch_common::config::LoopConfig;
use stealwatch_common::error::ExitStatus;
use stealwatch_common::time::StealDuration;
use stealwatch_core::sim::{SimSignal, SimStep};
use stealwatch_core::{
    ControlFlags, Monitor, MonotonicClock, PollWaiter, ReportKind, StealSampler, Verdict,
};

#[test]
fn test_on_time_iterations_report_no_misses() {
    let s = scenario(200, 10.0, vec![SimStep::elapse_ms(50); 10]);
    let summary = s.monitor.run();

    assert_eq!(summary.exit_status, ExitStatus::Success);
    assert_eq!(summary.statistics.missed_count(), 0);
    assert_eq!(summary.final_report.runtime_ns, 500_000_000);
    assert_eq!(
        summary.final_report.to_string(),
        "During 0.5000s runtime stealwatch was 0x not scheduled on time"
    );
}

#[test]
fn test_missed_wakeup_attributed_to_steal() {
    let mut s = scenario(200, 10.0, [SimStep::elapse_ms(250).with_steal_ms(30)]);
    let outcome = s.monitor.run_iteration().unwrap();

    assert!((outcome.steal_percent - 12.0).abs() < 1e-9);
    assert_eq!(outcome.verdict, Verdict::MissedWithSteal);
    assert_eq!(s.monitor.statistics().missed_count(), 1);
}

#[test]
fn test_missed_wakeup_without_steal() {
    let mut s = scenario(200, 10.0, [SimStep::elapse_ms(250).with_steal_ms(5)]);
    let outcome = s.monitor.run_iteration().unwrap();

    assert_eq!(outcome.verdict, Verdict::Missed);
    assert_eq!(s.monitor.statistics().steal_warnings(), 0);
}

#[test]
fn test_gap_equal_to_timeout_is_on_time() {
    let mut s = scenario(200, 10.0, [SimStep::elapse_ms(200).with_steal_ms(200)]);
    let outcome = s.monitor.run_iteration().unwrap();

    assert_eq!(outcome.verdict, Verdict::OnTime);
    assert_eq!(s.monitor.statistics().missed_count(), 0);
}

#[test]
fn test_dump_then_stop() {
    let steps = [
        SimStep::elapse_ms(20),
        SimStep::elapse_ms(300).with_signal(SimSignal::Dump),
        SimStep::elapse_ms(20),
        SimStep::elapse_ms(20).with_signal(SimSignal::Stop),
        SimStep::elapse_ms(20),
    ];
    let s = scenario(200, 10.0, steps);
    let summary = s.monitor.run();

    assert_eq!(summary.exit_status, ExitStatus::Success);
    assert_eq!(summary.statistics.iterations(), 4);
    assert_eq!(summary.statistics.interim_reports(), 1);
    assert_eq!(summary.statistics.missed_count(), 1);
    assert_eq!(summary.final_report.kind, ReportKind::Final);
    assert!(!s.flags.dump_pending());
    assert_eq!(s.sim.remaining_steps(), 1);
}

#[test]
fn test_wait_failure_reports_and_exits_2() {
    let s = scenario(200, 10.0, [SimStep::elapse_ms(10), SimStep::fail()]);
    let summary = s.monitor.run();

    assert_eq!(summary.exit_status.code(), 2);
    assert_eq!(summary.final_report.iterations, 1);
}

#[test]
fn test_wait_budget_is_a_third_of_timeout() {
    let s = scenario(3_600_000, 10.0, [SimStep::elapse_ms(1)]);
    s.monitor.run();
    assert_eq!(s.sim.waits(), vec![1_200_000]);
}

struct NoSteal;

impl StealSampler for NoSteal {
    fn try_sample(&mut self) -> Option<StealDuration> {
        Some(StealDuration::ZERO)
    }
}

#[test]
fn test_real_clock_and_poll() {
    let flags = Arc::new(ControlFlags::new());
    let config = LoopConfig::new(30, None, false).unwrap();
    let waiter = StopAfter {
        inner: PollWaiter,
        remaining: 5,
        flags: Arc::clone(&flags),
    };
    let monitor = Monitor::new(config, 10.0, flags, MonotonicClock, NoSteal, waiter);
    let summary = monitor.run();

    assert_eq!(summary.exit_status, ExitStatus::Success);
    assert_eq!(summary.statistics.iterations(), 5);
    // five 10ms waits
    assert!(summary.final_report.runtime_ns >= 45_000_000);
}

#[test]
#[ignore = "Timing sensitive, needs an idle host"]
fn test_idle_host_is_never_late() {
    let flags = Arc::new(ControlFlags::new());
    let config = LoopConfig::new(200, None, false).unwrap();
    let waiter = StopAfter {
        inner: PollWaiter,
        remaining: 30,
        flags: Arc::clone(&flags),
    };
    let summary = Monitor::new(config, 10.0, flags, MonotonicClock, NoSteal, waiter).run();

    assert_eq!(summary.statistics.missed_count(), 0);
    assert!(summary.statistics.max_elapsed_ns() < 200_000_000);
}
