//! Consistency validator
//!
//! Checks each incoming message against the same valve's previous message
//! and state machine:
//!
//! 1. timestamp must strictly increase
//! 2. gap since the previous message must not exceed `stale_threshold`
//!    (advisory only)
//! 3. sequence id must be previous + 1
//! 4. reported state must be reachable from the tracked state
//!
//! Checks are independent; one message can raise several anomalies. The
//! stored `last_message` is replaced on every call, anomalies or not, so the
//! next comparison is always against what the device most recently claimed.
//!
//! One `Validator` owns its registry exclusively. Callers that ingest from
//! several threads must route all messages through a single owner.

use crate::machine::Transition;
use crate::message::{DeviceMessage, ValveState};
use crate::registry::DeviceRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Longest tolerated gap between consecutive messages, in time units
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: f64,
}

fn default_stale_threshold() -> f64 {
    5.0
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            stale_threshold: default_stale_threshold(),
        }
    }
}

/// A detected violation for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Timestamp did not move forward
    NonMonotonicTimestamp { previous: f64, current: f64 },
    /// Too long since the previous message
    PossibleFaultyDevice { elapsed: f64 },
    /// Sequence id is not previous + 1
    SequenceGap { expected: i64, got: i64 },
    /// Reported state is unreachable from the tracked state
    IllegalStateTransition {
        from: ValveState,
        attempted: Transition,
    },
}

impl Anomaly {
    /// Stable snake_case code
    pub fn code(&self) -> &'static str {
        match self {
            Anomaly::NonMonotonicTimestamp { .. } => "non_monotonic_timestamp",
            Anomaly::PossibleFaultyDevice { .. } => "possible_faulty_device",
            Anomaly::SequenceGap { .. } => "sequence_gap",
            Anomaly::IllegalStateTransition { .. } => "illegal_state_transition",
        }
    }

    /// Advisory anomalies are worth reporting but are not violations
    pub fn is_advisory(&self) -> bool {
        matches!(self, Anomaly::PossibleFaultyDevice { .. })
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::NonMonotonicTimestamp { previous, current } => {
                write!(f, "timestamp {} not after previous {}", current, previous)
            }
            Anomaly::PossibleFaultyDevice { elapsed } => {
                write!(f, "possible faulty valve: {:.3}s since last message", elapsed)
            }
            Anomaly::SequenceGap { expected, got } => {
                write!(f, "sequence gap: expected id {}, got {}", expected, got)
            }
            Anomaly::IllegalStateTransition { from, attempted } => {
                write!(f, "illegal state transition: cannot {} from {}", attempted, from)
            }
        }
    }
}

/// The device's previous claim, kept on the outcome for reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorClaim {
    pub sequence_id: i64,
    pub timestamp: f64,
    pub reported_value: ValveState,
}

impl From<&DeviceMessage> for PriorClaim {
    fn from(message: &DeviceMessage) -> Self {
        Self {
            sequence_id: message.sequence_id,
            timestamp: message.timestamp,
            reported_value: message.reported_value,
        }
    }
}

/// Result of processing one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub device_id: String,
    pub sequence_id: i64,
    pub timestamp: f64,
    pub reported_value: ValveState,
    /// What the device claimed last time; `None` on first sighting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<PriorClaim>,
    /// In check order; each kind at most once
    pub anomalies: Vec<Anomaly>,
    /// True iff `anomalies` is empty
    pub accepted: bool,
    /// First message ever seen from this device
    pub first_sighting: bool,
    /// Tracked state after processing
    pub state: ValveState,
}

impl ValidationOutcome {
    /// Any anomaly that is not advisory
    pub fn has_violation(&self) -> bool {
        self.anomalies.iter().any(|a| !a.is_advisory())
    }

    pub fn has(&self, code: &str) -> bool {
        self.anomalies.iter().any(|a| a.code() == code)
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    config: ValidatorConfig,
    registry: DeviceRegistry,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            registry: DeviceRegistry::new(),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Validate one message and record it as the device's latest claim
    pub fn process(&mut self, message: DeviceMessage) -> ValidationOutcome {
        let stale_threshold = self.config.stale_threshold;
        let (record, first_sighting) = self.registry.get_or_create(&message.device_id);
        let mut anomalies = Vec::new();

        if first_sighting {
            // Devices may be first seen in any state; sync without judging.
            if let Err(e) = record.machine.apply_report(message.reported_value) {
                debug!("Could not sync new valve {}: {}", message.device_id, e);
            }
            debug!(
                "Registered valve {} in state {}",
                message.device_id,
                record.state()
            );
        } else {
            if let Some(previous) = &record.last_message {
                check_timing(previous, &message, stale_threshold, &mut anomalies);
                check_sequence(previous, &message, &mut anomalies);
            }

            match record.machine.apply_report(message.reported_value) {
                Ok(Some(transition)) => {
                    trace!("Valve {}: {} -> {}", message.device_id, transition, record.state());
                }
                Ok(None) => {}
                Err(e) => anomalies.push(Anomaly::IllegalStateTransition {
                    from: e.from,
                    attempted: e.attempted,
                }),
            }
        }

        let outcome = ValidationOutcome {
            device_id: message.device_id.clone(),
            sequence_id: message.sequence_id,
            timestamp: message.timestamp,
            reported_value: message.reported_value,
            previous: record.last_message.as_ref().map(PriorClaim::from),
            accepted: anomalies.is_empty(),
            anomalies,
            first_sighting,
            state: record.state(),
        };

        record.last_message = Some(message);
        outcome
    }
}

fn check_timing(
    previous: &DeviceMessage,
    current: &DeviceMessage,
    stale_threshold: f64,
    anomalies: &mut Vec<Anomaly>,
) {
    let elapsed = current.timestamp - previous.timestamp;

    // NaN never compares, so anything not provably forward counts as a regression
    if !elapsed.is_finite() || elapsed <= 0.0 {
        anomalies.push(Anomaly::NonMonotonicTimestamp {
            previous: previous.timestamp,
            current: current.timestamp,
        });
    } else if elapsed > stale_threshold {
        anomalies.push(Anomaly::PossibleFaultyDevice { elapsed });
    }
}

fn check_sequence(previous: &DeviceMessage, current: &DeviceMessage, anomalies: &mut Vec<Anomaly>) {
    let expected = previous.sequence_id.wrapping_add(1);
    if current.sequence_id != expected {
        anomalies.push(Anomaly::SequenceGap {
            expected,
            got: current.sequence_id,
        });
    }
}
