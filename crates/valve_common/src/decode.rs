//! Payload decoding - pure, touches no device state
//!
//! Field checks run in wire order (`id`, `valve_id`, `value`, `timestamp`)
//! and report the first failure. Unknown fields are ignored.

use crate::error::DecodeError;
use crate::message::{DeviceMessage, ValveState};
use serde_json::{Map, Value};

/// Decode a raw JSON payload into a typed message
pub fn decode(raw: &[u8]) -> Result<DeviceMessage, DecodeError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(DecodeError::Malformed(format!(
                "expected JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let sequence_id = field(&obj, "id")?
        .as_i64()
        .ok_or(DecodeError::InvalidValue("id"))?;

    let device_id = field(&obj, "valve_id")?
        .as_str()
        .map(str::to_string)
        .ok_or(DecodeError::InvalidValue("valve_id"))?;

    let reported_value = field(&obj, "value")?
        .as_str()
        .and_then(ValveState::parse)
        .ok_or(DecodeError::InvalidValue("value"))?;

    let timestamp = field(&obj, "timestamp")?
        .as_f64()
        .filter(|t| t.is_finite())
        .ok_or(DecodeError::InvalidValue("timestamp"))?;

    let state = obj
        .get("state")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(DeviceMessage {
        sequence_id,
        device_id,
        reported_value,
        timestamp,
        state,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, DecodeError> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(v) => Ok(v),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
