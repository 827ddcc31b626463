//! Running tally of validation results.

use crate::error::DecodeError;
use crate::validator::ValidationOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStats {
    /// Messages that decoded and went through the validator
    pub messages_processed: u64,
    pub accepted: u64,
    /// Flagged with at least one anomaly
    pub flagged: u64,
    /// Flagged with advisory anomalies only
    pub advisory_only: u64,
    pub devices_seen: u64,
    pub decode_failures: u64,
    /// Count per anomaly code
    pub anomalies: BTreeMap<String, u64>,
    /// Count per decode error code
    pub decode_errors: BTreeMap<String, u64>,
}

impl ValidationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&mut self, outcome: &ValidationOutcome) {
        self.messages_processed += 1;
        if outcome.first_sighting {
            self.devices_seen += 1;
        }

        if outcome.accepted {
            self.accepted += 1;
            return;
        }

        self.flagged += 1;
        if !outcome.has_violation() {
            self.advisory_only += 1;
        }
        for anomaly in &outcome.anomalies {
            *self.anomalies.entry(anomaly.code().to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_decode_failure(&mut self, error: &DecodeError) {
        self.decode_failures += 1;
        *self.decode_errors.entry(error.code().to_string()).or_insert(0) += 1;
    }

    /// Fraction of processed messages accepted (1.0 when nothing processed)
    pub fn acceptance_rate(&self) -> f64 {
        if self.messages_processed == 0 {
            return 1.0;
        }
        self.accepted as f64 / self.messages_processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DeviceMessage, ValveState};
    use crate::validator::Validator;

    #[test]
    fn test_stats_new() {
        let stats = ValidationStats::new();
        assert_eq!(stats.messages_processed, 0);
        assert_eq!(stats.acceptance_rate(), 1.0);
    }

    #[test]
    fn test_stats_record_outcomes() {
        let mut validator = Validator::default();
        let mut stats = ValidationStats::new();

        for message in [
            DeviceMessage::new(1, "v1", ValveState::Closed, 100.0),
            DeviceMessage::new(2, "v1", ValveState::Opened, 110.0),
            DeviceMessage::new(4, "v1", ValveState::Closed, 111.0),
            DeviceMessage::new(1, "v2", ValveState::Opened, 100.0),
        ] {
            stats.record_outcome(&validator.process(message));
        }

        assert_eq!(stats.messages_processed, 4);
        assert_eq!(stats.devices_seen, 2);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.flagged, 2);
        assert_eq!(stats.advisory_only, 1);
        assert_eq!(stats.anomalies.get("possible_faulty_device"), Some(&1));
        assert_eq!(stats.anomalies.get("sequence_gap"), Some(&1));
        assert!((stats.acceptance_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_record_decode_failure() {
        let mut stats = ValidationStats::new();
        stats.record_decode_failure(&DecodeError::MissingField("id"));
        stats.record_decode_failure(&DecodeError::MissingField("value"));

        assert_eq!(stats.decode_failures, 2);
        assert_eq!(stats.decode_errors.get("missing_field"), Some(&2));
        assert_eq!(stats.messages_processed, 0);
    }

    #[test]
    fn test_stats_serialization() {
        let mut stats = ValidationStats::new();
        stats.record_decode_failure(&DecodeError::InvalidValue("value"));

        let json = serde_json::to_string(&stats).unwrap();
        let parsed: ValidationStats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stats);
    }
}
