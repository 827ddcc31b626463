//! Shared types and the consistency-validation core for valve telemetry.
//!
//! A fleet of valves publishes status reports; this crate decodes those
//! reports, tracks one state machine and one last-known message per valve,
//! and flags reports that break sequencing, timing or state-transition rules.
//!
//! ```text
//! RawPayload ──decode──► DeviceMessage ──Validator::process──► ValidationOutcome
//!                                              │
//!                                   DeviceRegistry (per valve)
//!                                   ├─ ValveMachine
//!                                   └─ last_message
//! ```
//!
//! Nothing in here performs I/O. Transport and reporting live in `valved`.

pub mod decode;
pub mod error;
pub mod machine;
pub mod message;
pub mod registry;
pub mod stats;
pub mod topic;
pub mod validator;

pub use decode::decode;
pub use error::{DecodeError, TransitionError};
pub use machine::{Transition, ValveMachine};
pub use message::{DeviceMessage, RawPayload, ValveState};
pub use registry::{DeviceRecord, DeviceRegistry};
pub use stats::ValidationStats;
pub use validator::{Anomaly, PriorClaim, ValidationOutcome, Validator, ValidatorConfig};
