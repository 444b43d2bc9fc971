//! Steal time from the kernel's aggregate CPU accounting line.
//!
//! `/proc/stat` starts with a line of cumulative tick counters:
//!
//! ```text
//! cpu  user nice system idle iowait irq softirq steal guest guest_nice
//! ```
//!
//! The steal counter (8th) appeared in Linux 2.6.11. Kernels that report
//! four counters or fewer are treated as having no steal data.

use super::StealSampler;
use std::path::{Path, PathBuf};
use stealwatch_common::time::StealDuration;
use tracing::{debug, trace};

/// Default accounting source.
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Tick rate assumed when `sysconf(_SC_CLK_TCK)` fails.
pub const FALLBACK_CLOCK_TICKS: u64 = 100;

/// Fewer counters than this means the line carries no usable data.
const MIN_COUNTERS: usize = 5;

/// Counters of the aggregate `cpu` line, in clock ticks.
///
/// Counters the kernel did not report read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    /// Time spent in user mode.
    pub user: u64,
    /// Time spent in user mode with low priority (nice).
    pub nice: u64,
    /// Time spent in system mode.
    pub system: u64,
    /// Time spent idle.
    pub idle: u64,
    /// Time waiting for I/O to complete.
    pub iowait: u64,
    /// Time spent servicing hardware interrupts.
    pub irq: u64,
    /// Time spent servicing software interrupts.
    pub softirq: u64,
    /// Time stolen by the hypervisor.
    pub steal: u64,
}

impl CpuTicks {
    /// Parse the aggregate `cpu` line out of `/proc/stat` content.
    ///
    /// Per-CPU lines (`cpu0`, `cpu1`, ...) are skipped. Returns `None` if
    /// no aggregate line with at least five counters exists.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        content.lines().find_map(Self::parse_cpu_line)
    }

    fn parse_cpu_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("cpu") {
            return None;
        }

        let counters: Vec<u64> = parts.map_while(|s| s.parse().ok()).take(8).collect();
        if counters.len() < MIN_COUNTERS {
            return None;
        }

        let field = |idx: usize| counters.get(idx).copied().unwrap_or(0);
        Some(Self {
            user: field(0),
            nice: field(1),
            system: field(2),
            idle: field(3),
            iowait: field(4),
            irq: field(5),
            softirq: field(6),
            steal: field(7),
        })
    }
}

/// Number of kernel clock ticks per second.
#[must_use]
pub fn clock_ticks_per_sec() -> u64 {
    // SAFETY: sysconf is safe to call
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    u64::try_from(ticks)
        .ok()
        .filter(|&t| t > 0)
        .unwrap_or(FALLBACK_CLOCK_TICKS)
}

/// Reads steal ticks from the kernel accounting file on every sample.
#[derive(Debug, Clone)]
pub struct KernelStealSource {
    path: PathBuf,
    ticks_per_sec: u64,
}

impl Default for KernelStealSource {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelStealSource {
    /// Read from `/proc/stat`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(PROC_STAT_PATH)
    }

    /// Read from an alternate file with the same format.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ticks_per_sec: clock_ticks_per_sec(),
        }
    }

    /// Override the tick rate used for conversion.
    #[must_use]
    pub fn with_ticks_per_sec(mut self, ticks_per_sec: u64) -> Self {
        self.ticks_per_sec = if ticks_per_sec == 0 {
            FALLBACK_CLOCK_TICKS
        } else {
            ticks_per_sec
        };
        self
    }

    /// Accounting file being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tick rate used for conversion.
    #[must_use]
    pub fn ticks_per_sec(&self) -> u64 {
        self.ticks_per_sec
    }
}

impl StealSampler for KernelStealSource {
    fn try_sample(&mut self) -> Option<StealDuration> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Cannot read kernel CPU accounting"
                );
                return None;
            }
        };

        let ticks = CpuTicks::parse(&content)?;

        let steal = StealDuration::from_ticks(ticks.steal, self.ticks_per_sec);
        trace!(
            user = ticks.user,
            nice = ticks.nice,
            system = ticks.system,
            idle = ticks.idle,
            iowait = ticks.iowait,
            irq = ticks.irq,
            softirq = ticks.softirq,
            steal = ticks.steal,
            ticks_per_sec = self.ticks_per_sec,
            steal_ns = steal.as_nanos(),
            "Kernel CPU accounting"
        );
        Some(steal)
    }
}
