//! Scripted clock, steal source and waiter for driving the loop in tests.
//!
//! A [`Simulation`] holds a queue of [`SimStep`]s. Each bounded wait pops
//! one step and applies it: the clock and steal counters move, and an
//! optional signal is raised on the shared [`ControlFlags`]. Popping the
//! last step requests a stop, so a script of `n` steps runs exactly `n`
//! iterations.

use crate::clock::Clock;
use crate::control::ControlFlags;
use crate::steal::StealSampler;
use crate::wait::{WaitOutcome, Waiter};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use stealwatch_common::error::{MonitorError, MonitorResult};
use stealwatch_common::time::{StealDuration, Timestamp, NS_PER_MSEC};

/// How a counter moves during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDelta {
    /// Add nanoseconds.
    Advance(u64),
    /// Jump to an absolute nanosecond value (may go backwards).
    Reset(u64),
}

impl SimDelta {
    fn apply(self, value: u64) -> u64 {
        match self {
            Self::Advance(ns) => value.saturating_add(ns),
            Self::Reset(ns) => ns,
        }
    }
}

/// Signal delivered while the wait is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSignal {
    /// `SIGUSR1`.
    Dump,
    /// `SIGINT` / `SIGTERM`.
    Stop,
}

/// One scripted wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStep {
    clock: SimDelta,
    steal: SimDelta,
    signal: Option<SimSignal>,
    fail: bool,
}

impl SimStep {
    /// The wait lasts `ms` milliseconds with no steal time.
    #[must_use]
    pub fn elapse_ms(ms: u64) -> Self {
        Self::elapse_ns(ms.saturating_mul(NS_PER_MSEC))
    }

    /// The wait lasts `ns` nanoseconds with no steal time.
    #[must_use]
    pub fn elapse_ns(ns: u64) -> Self {
        Self {
            clock: SimDelta::Advance(ns),
            steal: SimDelta::Advance(0),
            signal: None,
            fail: false,
        }
    }

    /// The wait primitive fails.
    #[must_use]
    pub fn fail() -> Self {
        Self {
            fail: true,
            ..Self::elapse_ns(0)
        }
    }

    /// Accumulate `ms` of steal time during the wait.
    #[must_use]
    pub fn with_steal_ms(mut self, ms: u64) -> Self {
        self.steal = SimDelta::Advance(ms.saturating_mul(NS_PER_MSEC));
        self
    }

    /// Set the cumulative steal counter to `ns` after the wait.
    #[must_use]
    pub fn with_steal_reset(mut self, ns: u64) -> Self {
        self.steal = SimDelta::Reset(ns);
        self
    }

    /// Set the clock to `ns` after the wait.
    #[must_use]
    pub fn with_clock_reset(mut self, ns: u64) -> Self {
        self.clock = SimDelta::Reset(ns);
        self
    }

    /// Deliver `signal` during the wait, which then returns early.
    #[must_use]
    pub fn with_signal(mut self, signal: SimSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

#[derive(Debug)]
struct SimState {
    now_ns: u64,
    steal_ns: u64,
    steps: VecDeque<SimStep>,
    waits: Vec<u64>,
    flags: Arc<ControlFlags>,
}

/// Shared state behind the simulated collaborators.
#[derive(Debug, Clone)]
pub struct Simulation {
    state: Rc<RefCell<SimState>>,
}

impl Simulation {
    /// Start at clock and steal zero with an empty script.
    #[must_use]
    pub fn new(flags: Arc<ControlFlags>) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                now_ns: 0,
                steal_ns: 0,
                steps: VecDeque::new(),
                waits: Vec::new(),
                flags,
            })),
        }
    }

    /// Start the clock at `ns`.
    #[must_use]
    pub fn starting_at(self, ns: u64) -> Self {
        self.state.borrow_mut().now_ns = ns;
        self
    }

    /// Append steps to the script.
    #[must_use]
    pub fn with_steps(self, steps: impl IntoIterator<Item = SimStep>) -> Self {
        self.state.borrow_mut().steps.extend(steps);
        self
    }

    /// Clock handle.
    #[must_use]
    pub fn clock(&self) -> SimClock {
        SimClock(Rc::clone(&self.state))
    }

    /// Steal source handle.
    #[must_use]
    pub fn steal(&self) -> SimSteal {
        SimSteal(Rc::clone(&self.state))
    }

    /// Waiter handle.
    #[must_use]
    pub fn waiter(&self) -> SimWaiter {
        SimWaiter(Rc::clone(&self.state))
    }

    /// Budgets passed to every wait so far.
    #[must_use]
    pub fn waits(&self) -> Vec<u64> {
        self.state.borrow().waits.clone()
    }

    /// Steps not yet consumed.
    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        self.state.borrow().steps.len()
    }
}

/// Simulated [`Clock`].
#[derive(Debug)]
pub struct SimClock(Rc<RefCell<SimState>>);

impl Clock for SimClock {
    fn now(&mut self) -> Timestamp {
        Timestamp::from_nanos(self.0.borrow().now_ns)
    }
}

/// Simulated [`StealSampler`].
#[derive(Debug)]
pub struct SimSteal(Rc<RefCell<SimState>>);

impl StealSampler for SimSteal {
    fn try_sample(&mut self) -> Option<StealDuration> {
        Some(StealDuration::from_nanos(self.0.borrow().steal_ns))
    }
}

/// Simulated [`Waiter`].
#[derive(Debug)]
pub struct SimWaiter(Rc<RefCell<SimState>>);

impl Waiter for SimWaiter {
    fn wait(&mut self, timeout_ms: u64) -> MonitorResult<WaitOutcome> {
        let mut state = self.0.borrow_mut();
        state.waits.push(timeout_ms);

        let Some(step) = state.steps.pop_front() else {
            state.flags.request_stop();
            return Ok(WaitOutcome::TimedOut);
        };
        if state.steps.is_empty() {
            state.flags.request_stop();
        }
        if step.fail {
            return Err(MonitorError::Wait("simulated poll failure".into()));
        }

        state.now_ns = step.clock.apply(state.now_ns);
        state.steal_ns = step.steal.apply(state.steal_ns);

        match step.signal {
            Some(SimSignal::Dump) => {
                state.flags.request_dump();
                Ok(WaitOutcome::Interrupted)
            }
            Some(SimSignal::Stop) => {
                state.flags.request_stop();
                Ok(WaitOutcome::Interrupted)
            }
            None => Ok(WaitOutcome::TimedOut),
        }
    }
}
