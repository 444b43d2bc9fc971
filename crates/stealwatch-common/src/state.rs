//! Measurement loop state machine.
//!
//! State transitions:
//! RUNNING → STOPPING → STOPPED
//!
//! STOPPING is entered on a stop request or a fatal wait failure and still
//! emits the final statistics report before the loop reaches STOPPED.

use crate::error::{MonitorError, MonitorResult};
use std::fmt;

/// States of the measurement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopState {
    /// Iterating: sample, wait, sample, classify.
    #[default]
    Running,
    /// Leaving the loop; the final report is still pending.
    Stopping,
    /// Final report emitted.
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl LoopState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: LoopState) -> bool {
        use LoopState::{Running, Stopped, Stopping};

        matches!((self, target), (Running, Stopping) | (Stopping, Stopped))
    }

    /// Returns true once the loop no longer iterates.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

/// State machine wrapper with transition tracking.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: LoopState,
    previous: Option<LoopState>,
    transition_count: u64,
}

impl StateMachine {
    /// Create a new state machine starting in RUNNING.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.current
    }

    /// Get the previous state (if any transition occurred).
    #[must_use]
    pub fn previous_state(&self) -> Option<LoopState> {
        self.previous
    }

    /// Get total number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidStateTransition`] if `target` is not
    /// reachable from the current state.
    pub fn transition(&mut self, target: LoopState) -> MonitorResult<()> {
        if self.current.can_transition_to(target) {
            self.previous = Some(self.current);
            self.current = target;
            self.transition_count += 1;
            Ok(())
        } else {
            Err(MonitorError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }
}
