#![doc = "Scheduling-delay measurement core for stealwatch."]

pub mod clock;
pub mod control;
pub mod guestlib;
pub mod monitor;
pub mod report;
pub mod sim;
pub mod steal;
pub mod wait;

pub use clock::*;
pub use control::*;
pub use guestlib::{GuestLib, GuestLibError, VmGuestLib};
pub use monitor::*;
pub use report::*;
pub use steal::*;
pub use wait::*;

use std::sync::Arc;
use stealwatch_common::config::LoopConfig;
use stealwatch_common::error::ExitStatus;
use tracing::info;

/// Select a steal-time provider and run the measurement loop until a stop
/// is requested through `flags`.
///
/// Returns [`ExitStatus::WaitFailure`] if the bounded wait fails.
pub fn run(config: &LoopConfig, flags: Arc<ControlFlags>) -> ExitStatus {
    let steal = StealSource::detect();
    let provider = steal.kind();
    let threshold = config.steal_threshold_or(provider.default_threshold_percent());
    info!(
        %provider,
        steal_threshold_percent = threshold,
        user_supplied = config.steal_threshold_override().is_some(),
        "Steal time source selected"
    );

    let monitor = Monitor::new(*config, threshold, flags, MonotonicClock, steal, PollWaiter);
    monitor.run().exit_status
}
