//! Steal-time accounting through the kernel provider.

use super::common::write_proc_stat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stealwatch_common::config::LoopConfig;
use stealwatch_common::error::MonitorResult;
use stealwatch_common::time::StealDuration;
use stealwatch_core::guestlib::{GuestLib, GuestLibError};
use stealwatch_core::sim::{SimStep, Simulation};
use stealwatch_core::{
    ControlFlags, KernelStealSource, Monitor, ProviderKind, StealSampler, StealSource, Verdict,
    WaitOutcome, Waiter,
};

#[test]
fn test_legacy_four_counter_line_reads_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat");
    std::fs::write(&path, "cpu  4705 356 584 3699\ncpu0 4705 356 584 3699\n").unwrap();

    let mut source = KernelStealSource::with_path(&path).with_ticks_per_sec(100);
    assert_eq!(source.sample(), StealDuration::ZERO);
}

#[test]
fn test_unreadable_source_reads_zero() {
    let mut source = KernelStealSource::with_path("/nonexistent/proc/stat");
    assert_eq!(source.sample(), StealDuration::ZERO);
}

#[test]
fn test_source_is_reread_every_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat");
    let mut source = KernelStealSource::with_path(&path).with_ticks_per_sec(100);

    write_proc_stat(&path, 10);
    assert_eq!(source.sample().as_nanos(), 100_000_000);
    write_proc_stat(&path, 25);
    assert_eq!(source.sample().as_nanos(), 250_000_000);
}

struct AbsentGuestLib;

impl GuestLib for AbsentGuestLib {
    type Handle = ();

    fn open(&self) -> Result<(), GuestLibError> {
        Err(GuestLibError::Unavailable("not in a VM".into()))
    }

    fn stolen_ms(&self, _handle: &mut ()) -> Result<u64, GuestLibError> {
        unreachable!("never opened")
    }

    fn close(&self, _handle: ()) {}
}

#[test]
fn test_detection_falls_back_to_kernel_default_threshold() {
    let source = StealSource::detect_with(|| Ok(AbsentGuestLib), KernelStealSource::new());
    assert_eq!(source.kind(), ProviderKind::Kernel);

    let config = LoopConfig::new(200, None, true).unwrap();
    let threshold = config.steal_threshold_or(source.kind().default_threshold_percent());
    assert!((threshold - 10.0).abs() < f64::EPSILON);

    let overridden = LoopConfig::new(200, Some(55.0), true).unwrap();
    assert!((overridden.steal_threshold_or(10.0) - 55.0).abs() < f64::EPSILON);
}

/// Advances the simulation and rewrites the stat file with a new steal
/// counter on every wait, as the kernel would while we are descheduled.
struct StealingWaiter {
    inner: stealwatch_core::sim::SimWaiter,
    path: PathBuf,
    steal_ticks: u64,
    ticks_per_wait: u64,
}

impl Waiter for StealingWaiter {
    fn wait(&mut self, timeout_ms: u64) -> MonitorResult<WaitOutcome> {
        self.steal_ticks += self.ticks_per_wait;
        write_proc_stat(&self.path, self.steal_ticks);
        self.inner.wait(timeout_ms)
    }
}

type KernelMonitor =
    Monitor<stealwatch_core::sim::SimClock, StealSource<AbsentGuestLib>, StealingWaiter>;

/// A 250ms gap per wait, with `ticks_per_wait` steal ticks written to `path`.
fn kernel_monitor(path: &Path, ticks_per_wait: u64) -> KernelMonitor {
    let flags = Arc::new(ControlFlags::new());
    let sim = Simulation::new(Arc::clone(&flags))
        .with_steps([SimStep::elapse_ms(250), SimStep::elapse_ms(250)]);
    let waiter = StealingWaiter {
        inner: sim.waiter(),
        path: path.to_path_buf(),
        steal_ticks: 0,
        ticks_per_wait,
    };
    let kernel = KernelStealSource::with_path(path).with_ticks_per_sec(100);
    let config = LoopConfig::new(200, None, false).unwrap();

    Monitor::new(config, 10.0, flags, sim.clock(), StealSource::Kernel(kernel), waiter)
}

#[test]
fn test_loop_with_kernel_counters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat");
    write_proc_stat(&path, 0);

    let mut monitor = kernel_monitor(&path, 5);
    let outcome = monitor.run_iteration().unwrap();

    // 5 ticks at 100 Hz over a 250ms gap
    assert_eq!(outcome.steal_elapsed_ns, 50_000_000);
    assert!((outcome.steal_percent - 20.0).abs() < 1e-9);
    assert_eq!(outcome.verdict, Verdict::MissedWithSteal);
}

#[test]
fn test_accounting_file_appearing_mid_iteration_is_not_blamed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat");

    // unreadable before the wait, an hour of cumulative steal after it
    let mut monitor = kernel_monitor(&path, 360_000);
    let outcome = monitor.run_iteration().unwrap();

    assert_eq!(outcome.steal_elapsed_ns, 0);
    assert_eq!(outcome.steal_percent, 0.0);
    assert_eq!(outcome.verdict, Verdict::Missed);
    assert_eq!(monitor.statistics().steal_warnings(), 0);

    // both samples readable again on the next iteration
    let outcome = monitor.run_iteration().unwrap();
    assert_eq!(outcome.steal_elapsed_ns, 3_600_000_000_000);
    assert_eq!(outcome.verdict, Verdict::MissedWithSteal);
}
