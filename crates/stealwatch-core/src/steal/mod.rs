//! Steal-time accounting.
//!
//! Two interchangeable providers feed the measurement loop:
//! - [`KernelStealSource`] reads tick counters from `/proc/stat`.
//! - [`GuestStealSource`] asks a hypervisor guest library.
//!
//! [`StealSource::detect`] picks one before the loop starts and it stays
//! active for the whole run.

mod guest;
mod kernel;

pub use guest::GuestStealSource;
pub use kernel::{
    clock_ticks_per_sec, CpuTicks, KernelStealSource, FALLBACK_CLOCK_TICKS, PROC_STAT_PATH,
};

use crate::guestlib::{GuestLib, GuestLibError, VmGuestLib};
use std::fmt;
use stealwatch_common::time::StealDuration;
use tracing::{debug, info};

/// Default steal threshold with kernel counters (bare metal or plain KVM).
pub const KERNEL_STEAL_THRESHOLD_PERCENT: f64 = 10.0;

/// Default steal threshold inside a VM with a guest library, where steal
/// time is routine.
pub const GUEST_STEAL_THRESHOLD_PERCENT: f64 = 100.0;

/// Source of cumulative steal time.
pub trait StealSampler {
    /// Current cumulative steal time, or `None` if it could not be read.
    fn try_sample(&mut self) -> Option<StealDuration>;

    /// Current cumulative steal time. Failures read as zero.
    fn sample(&mut self) -> StealDuration {
        self.try_sample().unwrap_or(StealDuration::ZERO)
    }
}

/// Which provider is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Kernel accounting counters.
    Kernel,
    /// Hypervisor guest library.
    HypervisorGuest,
}

impl ProviderKind {
    /// Steal threshold used when the user supplies none.
    #[must_use]
    pub fn default_threshold_percent(self) -> f64 {
        match self {
            Self::Kernel => KERNEL_STEAL_THRESHOLD_PERCENT,
            Self::HypervisorGuest => GUEST_STEAL_THRESHOLD_PERCENT,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kernel => write!(f, "kernel"),
            Self::HypervisorGuest => write!(f, "guest-library"),
        }
    }
}

/// The steal-time provider selected for this run.
pub enum StealSource<L: GuestLib = VmGuestLib> {
    /// Kernel accounting counters.
    Kernel(KernelStealSource),
    /// Hypervisor guest library.
    HypervisorGuest(GuestStealSource<L>),
}

impl StealSource {
    /// Prefer the VMware guest library, fall back to `/proc/stat`.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_with(VmGuestLib::load, KernelStealSource::new())
    }
}

impl<L: GuestLib> StealSource<L> {
    /// Try `load` and open a handle on the result; use `kernel` otherwise.
    ///
    /// Guest library failures are expected on hosts without one and are
    /// only logged at debug level.
    pub fn detect_with<F>(load: F, kernel: KernelStealSource) -> Self
    where
        F: FnOnce() -> Result<L, GuestLibError>,
    {
        match load().and_then(GuestStealSource::open) {
            Ok(guest) => {
                info!("Using hypervisor guest library for steal time");
                Self::HypervisorGuest(guest)
            }
            Err(e) => {
                debug!(
                    error = %e,
                    path = %kernel.path().display(),
                    "Guest library unavailable, using kernel steal counters"
                );
                Self::Kernel(kernel)
            }
        }
    }

    /// Active provider.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Kernel(_) => ProviderKind::Kernel,
            Self::HypervisorGuest(_) => ProviderKind::HypervisorGuest,
        }
    }
}

impl<L: GuestLib> StealSampler for StealSource<L> {
    fn try_sample(&mut self) -> Option<StealDuration> {
        match self {
            Self::Kernel(source) => source.try_sample(),
            Self::HypervisorGuest(source) => source.try_sample(),
        }
    }
}
