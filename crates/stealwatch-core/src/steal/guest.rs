//! Steal time from a hypervisor guest library.

use super::StealSampler;
use crate::guestlib::{GuestLib, GuestLibError};
use stealwatch_common::time::StealDuration;
use tracing::warn;

/// Queries an open guest-library handle for stolen milliseconds.
///
/// The handle is closed when the source is dropped.
#[derive(Debug)]
pub struct GuestStealSource<L: GuestLib> {
    lib: L,
    handle: Option<L::Handle>,
}

impl<L: GuestLib> GuestStealSource<L> {
    /// Open a handle on `lib`.
    ///
    /// # Errors
    ///
    /// Returns the library error if the handle cannot be opened.
    pub fn open(lib: L) -> Result<Self, GuestLibError> {
        let handle = lib.open()?;
        Ok(Self {
            lib,
            handle: Some(handle),
        })
    }
}

impl<L: GuestLib> StealSampler for GuestStealSource<L> {
    fn try_sample(&mut self) -> Option<StealDuration> {
        let handle = self.handle.as_mut()?;

        match self.lib.stolen_ms(handle) {
            Ok(ms) => Some(StealDuration::from_millis(ms)),
            Err(e) => {
                warn!(error = %e, "Guest library steal time query failed");
                None
            }
        }
    }
}

impl<L: GuestLib> Drop for GuestStealSource<L> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.lib.close(handle);
        }
    }
}
