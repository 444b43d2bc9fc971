//! Detach from the controlling terminal.

use nix::unistd::{fork, setsid, ForkResult};
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use thiserror::Error;

/// Daemonization errors.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// `fork` failed.
    #[error("fork failed: {0}")]
    Fork(#[source] nix::errno::Errno),

    /// `setsid` failed.
    #[error("setsid failed: {0}")]
    Setsid(#[source] nix::errno::Errno),

    /// `/dev/null` could not be opened or duplicated.
    #[error("failed to redirect standard streams to /dev/null: {0}")]
    Redirect(#[source] std::io::Error),
}

/// Fork into the background.
///
/// The parent exits with status 0. The child becomes a session leader with
/// stdin, stdout and stderr pointing at `/dev/null`. Must be called before
/// any other thread is started.
///
/// # Errors
///
/// Returns an error in the child (or the calling process if the fork
/// itself failed).
pub fn daemonize() -> Result<(), DaemonizeError> {
    // SAFETY: single-threaded at this point, the child continues normally.
    match unsafe { fork() }.map_err(DaemonizeError::Fork)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(DaemonizeError::Setsid)?;
    redirect_stdio()
}

fn redirect_stdio() -> Result<(), DaemonizeError> {
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(DaemonizeError::Redirect)?;

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid for the duration of the call.
        if unsafe { libc::dup2(devnull.as_raw_fd(), target) } == -1 {
            return Err(DaemonizeError::Redirect(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}
