//! Signal bridge.
//!
//! `SIGINT` and `SIGTERM` request a stop, `SIGUSR1` requests an interim
//! statistics report. Handlers only store into the shared
//! [`ControlFlags`]; the measurement loop observes them at the top of each
//! iteration.
//!
//! Handlers are installed without `SA_RESTART` so a blocked `poll` returns
//! `EINTR` and the loop reacts without waiting out its budget.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::raw::c_int;
use std::sync::{Arc, OnceLock};
use stealwatch_core::control::ControlFlags;
use thiserror::Error;
use tracing::debug;

static FLAGS: OnceLock<Arc<ControlFlags>> = OnceLock::new();

/// Signals the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - termination request.
    Terminate,
    /// SIGINT - interrupt (Ctrl+C).
    Interrupt,
    /// SIGUSR1 - dump statistics.
    Dump,
}

impl SignalKind {
    const ALL: [SignalKind; 3] = [Self::Terminate, Self::Interrupt, Self::Dump];

    fn signal(self) -> Signal {
        match self {
            Self::Terminate => Signal::SIGTERM,
            Self::Interrupt => Signal::SIGINT,
            Self::Dump => Signal::SIGUSR1,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.signal().as_str())
    }
}

/// Signal registration errors.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Handlers were already installed in this process.
    #[error("signal handlers already installed")]
    AlreadyInstalled,

    /// `sigaction` failed.
    #[error("failed to register {signal} handler: {source}")]
    Register {
        /// Signal being registered.
        signal: SignalKind,
        /// Underlying errno.
        #[source]
        source: nix::errno::Errno,
    },
}

/// Publish `flags` to the handlers and register them.
///
/// # Errors
///
/// Fails if called twice or if `sigaction` rejects a handler.
pub fn install(flags: Arc<ControlFlags>) -> Result<(), SignalError> {
    FLAGS.set(flags).map_err(|_| SignalError::AlreadyInstalled)?;

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for kind in SignalKind::ALL {
        // SAFETY: the handler only performs atomic stores.
        unsafe { sigaction(kind.signal(), &action) }
            .map_err(|source| SignalError::Register { signal: kind, source })?;
    }

    debug!("Signal handlers registered");
    Ok(())
}

extern "C" fn handle_signal(signum: c_int) {
    let Some(flags) = FLAGS.get() else {
        return;
    };
    if signum == libc::SIGUSR1 {
        flags.request_dump();
    } else {
        flags.request_stop();
    }
}
