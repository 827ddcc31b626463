//! Telemetry message types
//!
//! Wire field names are fixed by the devices: `id`, `valve_id`, `value`,
//! `timestamp`. Devices may add a human-readable `state` label, which is
//! carried through when present but never required.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete valve state, as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveState {
    Opened,
    Closed,
    Faulty,
}

impl ValveState {
    /// All states, in wire order
    pub const ALL: [ValveState; 3] = [ValveState::Opened, ValveState::Closed, ValveState::Faulty];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValveState::Opened => "opened",
            ValveState::Closed => "closed",
            ValveState::Faulty => "faulty",
        }
    }

    /// Parse a wire name; exact match only
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "opened" => Some(ValveState::Opened),
            "closed" => Some(ValveState::Closed),
            "faulty" => Some(ValveState::Faulty),
            _ => None,
        }
    }

    /// Human label devices send in the optional `state` field
    pub fn label(&self) -> &'static str {
        match self {
            ValveState::Opened => "Valve open",
            ValveState::Closed => "Valve closed",
            ValveState::Faulty => "Valve faulty",
        }
    }
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry report from one valve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    /// Per-device counter, +1 per message
    #[serde(rename = "id")]
    pub sequence_id: i64,

    #[serde(rename = "valve_id")]
    pub device_id: String,

    #[serde(rename = "value")]
    pub reported_value: ValveState,

    /// Seconds, fractional allowed
    pub timestamp: f64,

    /// Optional human label, ignored by validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl DeviceMessage {
    pub fn new(
        sequence_id: i64,
        device_id: impl Into<String>,
        reported_value: ValveState,
        timestamp: f64,
    ) -> Self {
        Self {
            sequence_id,
            device_id: device_id.into(),
            reported_value,
            timestamp,
            state: None,
        }
    }
}

/// Undecoded payload as delivered by the transport, tagged with the topic it
/// arrived on. An empty topic means the transport gave no hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawPayload {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Device id suggested by the topic, if the topic names one
    pub fn device_hint(&self) -> Option<&str> {
        crate::topic::device_from_topic(&self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse_is_exact() {
        for state in ValveState::ALL {
            assert_eq!(ValveState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ValveState::parse("Opened"), None);
        assert_eq!(ValveState::parse("open"), None);
        assert_eq!(ValveState::parse(""), None);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ValveState::Faulty).unwrap();
        assert_eq!(json, "\"faulty\"");
    }

    #[test]
    fn test_message_serializes_wire_names() {
        let msg = DeviceMessage::new(7, "v1", ValveState::Opened, 100.5);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["valve_id"], "v1");
        assert_eq!(value["value"], "opened");
        assert_eq!(value["timestamp"], 100.5);
        assert!(value.get("state").is_none());
    }

    #[test]
    fn test_raw_payload_device_hint() {
        let raw = RawPayload::new("sensors/valves/v9", "{}");
        assert_eq!(raw.device_hint(), Some("v9"));
        assert_eq!(RawPayload::new("", "{}").device_hint(), None);
    }
}
