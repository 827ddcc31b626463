//! Valve state machine
//!
//! Three states, five transitions. Initial state is `closed`.
//!
//! ```text
//!            open                fault
//!   closed ────────► opened ───────────┐
//!     ▲  ◄──────────                   ▼
//!     │      close                   faulty
//!     │                                │
//!     └────────────── reset ───────────┘
//!   (closed ──fault──► faulty as well; cycle = open | close)
//! ```
//!
//! A failed transition leaves the state untouched.

use crate::error::TransitionError;
use crate::message::ValveState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named transition operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Open,
    Close,
    Fault,
    Reset,
    Cycle,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Open => "open",
            Transition::Close => "close",
            Transition::Fault => "fault",
            Transition::Reset => "reset",
            Transition::Cycle => "cycle",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (operation, precondition, result)
const TRANSITIONS: &[(Transition, ValveState, ValveState)] = &[
    (Transition::Open, ValveState::Closed, ValveState::Opened),
    (Transition::Close, ValveState::Opened, ValveState::Closed),
    (Transition::Fault, ValveState::Opened, ValveState::Faulty),
    (Transition::Fault, ValveState::Closed, ValveState::Faulty),
    (Transition::Reset, ValveState::Faulty, ValveState::Closed),
    (Transition::Cycle, ValveState::Closed, ValveState::Opened),
    (Transition::Cycle, ValveState::Opened, ValveState::Closed),
];

/// Look up the result of `transition` from `from`, if legal
pub fn next_state(from: ValveState, transition: Transition) -> Option<ValveState> {
    TRANSITIONS
        .iter()
        .find(|(t, pre, _)| *t == transition && *pre == from)
        .map(|(_, _, to)| *to)
}

/// Per-valve state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveMachine {
    state: ValveState,
}

impl Default for ValveMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ValveMachine {
    /// New machine in `closed`
    pub fn new() -> Self {
        Self {
            state: ValveState::Closed,
        }
    }

    pub fn state(&self) -> ValveState {
        self.state
    }

    /// Attempt a transition; on failure the state is unchanged
    pub fn apply(&mut self, transition: Transition) -> Result<ValveState, TransitionError> {
        match next_state(self.state, transition) {
            Some(to) => {
                self.state = to;
                Ok(to)
            }
            None => Err(TransitionError {
                from: self.state,
                attempted: transition,
            }),
        }
    }

    pub fn open(&mut self) -> Result<ValveState, TransitionError> {
        self.apply(Transition::Open)
    }

    pub fn close(&mut self) -> Result<ValveState, TransitionError> {
        self.apply(Transition::Close)
    }

    pub fn fault(&mut self) -> Result<ValveState, TransitionError> {
        self.apply(Transition::Fault)
    }

    pub fn reset(&mut self) -> Result<ValveState, TransitionError> {
        self.apply(Transition::Reset)
    }

    pub fn cycle(&mut self) -> Result<ValveState, TransitionError> {
        self.apply(Transition::Cycle)
    }

    /// Mirror a state reported by the device.
    ///
    /// Re-reporting the current state is a no-op and returns `Ok(None)`.
    /// Otherwise the report maps to a transition (`opened` → open,
    /// `closed` → close, or reset when leaving `faulty`, `faulty` → fault)
    /// which is attempted against the current state.
    pub fn apply_report(
        &mut self,
        reported: ValveState,
    ) -> Result<Option<Transition>, TransitionError> {
        if reported == self.state {
            return Ok(None);
        }

        let transition = match (self.state, reported) {
            (ValveState::Faulty, ValveState::Closed) => Transition::Reset,
            (_, ValveState::Opened) => Transition::Open,
            (_, ValveState::Closed) => Transition::Close,
            (_, ValveState::Faulty) => Transition::Fault,
        };

        self.apply(transition).map(|_| Some(transition))
    }
}
