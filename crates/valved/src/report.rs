//! Outcome reporting
//!
//! The validator returns outcomes as data; an `OutcomeSink` decides what to
//! do with them. `LogReporter` writes them to the tracing log and keeps a
//! running `ValidationStats` tally.

use tracing::{debug, error, info, warn};
use valve_common::{Anomaly, DecodeError, RawPayload, ValidationOutcome, ValidationStats};

/// Receiver for everything the ingestor produces
pub trait OutcomeSink {
    /// Called once per validated message
    fn outcome(&mut self, outcome: &ValidationOutcome);

    /// Called once per payload that failed to decode
    fn decode_failed(&mut self, raw: &RawPayload, error: &DecodeError);

    /// Periodic tick from the consumer loop
    fn heartbeat(&mut self) {}
}

#[derive(Debug, Default)]
pub struct LogReporter {
    stats: ValidationStats,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Log the running tally as one JSON line
    pub fn log_stats(&self) {
        match self.stats_line() {
            Ok(line) => info!("{}", line),
            Err(e) => warn!("Failed to serialize stats: {}", e),
        }
    }

    fn stats_line(&self) -> serde_json::Result<String> {
        let json = serde_json::to_string(&self.stats)?;
        Ok(format!(
            "Validation stats (acceptance {:.1}%): {}",
            self.stats.acceptance_rate() * 100.0,
            json
        ))
    }
}

/// One log line for an anomaly, with the previous claim alongside the
/// current one when there is a previous claim
fn anomaly_line(outcome: &ValidationOutcome, anomaly: &Anomaly) -> String {
    let current = format!(
        "id {} {} at {}",
        outcome.sequence_id, outcome.reported_value, outcome.timestamp
    );
    match &outcome.previous {
        Some(prev) => format!(
            "Valve {}: {} (prev: id {} {} at {}, curr: {})",
            outcome.device_id, anomaly, prev.sequence_id, prev.reported_value, prev.timestamp, current
        ),
        None => format!("Valve {}: {} (curr: {})", outcome.device_id, anomaly, current),
    }
}

impl OutcomeSink for LogReporter {
    fn outcome(&mut self, outcome: &ValidationOutcome) {
        self.stats.record_outcome(outcome);

        if outcome.accepted {
            debug!(
                "Valve {} message {} ok (state={})",
                outcome.device_id, outcome.sequence_id, outcome.state
            );
            return;
        }

        for anomaly in &outcome.anomalies {
            let line = anomaly_line(outcome, anomaly);
            if anomaly.is_advisory() {
                warn!("{}", line);
            } else {
                error!("{}", line);
            }
        }
    }

    fn decode_failed(&mut self, raw: &RawPayload, error: &DecodeError) {
        self.stats.record_decode_failure(error);
        warn!(
            "Undecodable payload on topic {:?} ({} bytes): {}",
            raw.topic,
            raw.payload.len(),
            error
        );
    }

    fn heartbeat(&mut self) {
        self.log_stats();
    }
}
