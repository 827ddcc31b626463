//! Error types for valve telemetry.

use crate::machine::Transition;
use crate::message::ValveState;
use thiserror::Error;

/// Structural problem with a raw payload, detected before any device state
/// is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field: {0}")]
    InvalidValue(&'static str),
}

impl DecodeError {
    /// Stable code for logs and counters
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed",
            DecodeError::MissingField(_) => "missing_field",
            DecodeError::InvalidValue(_) => "invalid_value",
        }
    }
}

/// A transition was attempted from a state that does not allow it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal transition: cannot {attempted} from {from}")]
pub struct TransitionError {
    pub from: ValveState,
    pub attempted: Transition,
}
