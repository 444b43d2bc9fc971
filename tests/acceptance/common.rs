//! Common helpers for acceptance tests.

#![allow(dead_code)] // Not every scenario file uses every helper

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use stealwatch_common::config::LoopConfig;
use stealwatch_common::error::MonitorResult;
use stealwatch_core::sim::{SimClock, SimSteal, SimStep, SimWaiter, Simulation};
use stealwatch_core::{ControlFlags, Monitor, WaitOutcome, Waiter};

/// A monitor wired to a simulation.
pub struct Scenario {
    pub monitor: Monitor<SimClock, SimSteal, SimWaiter>,
    pub sim: Simulation,
    pub flags: Arc<ControlFlags>,
}

/// Build a simulated monitor with the given timeout, threshold and script.
pub fn scenario(
    timeout_ms: u64,
    threshold_percent: f64,
    steps: impl IntoIterator<Item = SimStep>,
) -> Scenario {
    let flags = Arc::new(ControlFlags::new());
    let sim = Simulation::new(Arc::clone(&flags)).with_steps(steps);
    let config =
        LoopConfig::new(timeout_ms, Some(threshold_percent), false).expect("valid loop config");
    let monitor = Monitor::new(
        config,
        threshold_percent,
        Arc::clone(&flags),
        sim.clock(),
        sim.steal(),
        sim.waiter(),
    );
    Scenario { monitor, sim, flags }
}

/// Write a `/proc/stat` style file whose aggregate line carries `steal` ticks.
pub fn write_proc_stat(path: &Path, steal: u64) {
    let mut file = std::fs::File::create(path).expect("create proc stat fixture");
    writeln!(file, "cpu  4705 356 584 3699 23 23 0 {steal} 0 0").unwrap();
    writeln!(file, "cpu0 1393 280 471 3699 23 23 0 {steal} 0 0").unwrap();
    writeln!(file, "intr 114930548 113199788 3 0 5 263 0 4").unwrap();
    writeln!(file, "ctxt 1990473").unwrap();
}

/// Wraps a waiter and requests a stop after a fixed number of waits.
pub struct StopAfter<W> {
    pub inner: W,
    pub remaining: u32,
    pub flags: Arc<ControlFlags>,
}

impl<W: Waiter> Waiter for StopAfter<W> {
    fn wait(&mut self, timeout_ms: u64) -> MonitorResult<WaitOutcome> {
        let outcome = self.inner.wait(timeout_ms)?;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.flags.request_stop();
        }
        Ok(outcome)
    }
}
