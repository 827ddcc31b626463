//! Ingestion: raw payload -> topic filter -> decode -> validate -> report
//!
//! The `Ingestor` owns the validator, so whoever owns the `Ingestor` is the
//! only writer to the device registry. The daemon keeps exactly one, inside
//! the task spawned by `run`, and every connection feeds it through a
//! channel. Per-valve messages are therefore processed strictly in arrival
//! order.

use crate::report::OutcomeSink;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use valve_common::topic::topic_matches;
use valve_common::{decode, DecodeError, RawPayload, ValidationOutcome, Validator, ValidatorConfig};

/// What happened to one payload
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// Decoded and validated
    Outcome(ValidationOutcome),
    /// Topic did not match the subscription filter
    Filtered,
    /// Payload was structurally invalid; no device state was touched
    DecodeFailed(DecodeError),
}

pub struct Ingestor<S: OutcomeSink> {
    validator: Validator,
    topic_filter: String,
    sink: S,
}

impl<S: OutcomeSink> Ingestor<S> {
    pub fn new(config: ValidatorConfig, topic_filter: impl Into<String>, sink: S) -> Self {
        Self {
            validator: Validator::new(config),
            topic_filter: topic_filter.into(),
            sink,
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Push one payload through the pipeline
    pub fn ingest(&mut self, raw: RawPayload) -> Ingested {
        if !raw.topic.is_empty() && !topic_matches(&self.topic_filter, &raw.topic) {
            debug!("Dropping frame on unsubscribed topic {}", raw.topic);
            return Ingested::Filtered;
        }

        let message = match decode(&raw.payload) {
            Ok(message) => message,
            Err(e) => {
                self.sink.decode_failed(&raw, &e);
                return Ingested::DecodeFailed(e);
            }
        };

        if let Some(hint) = raw.device_hint() {
            if hint != message.device_id {
                warn!(
                    "Topic {} names valve {} but payload says {}; using payload",
                    raw.topic, hint, message.device_id
                );
            }
        }

        let outcome = self.validator.process(message);
        self.sink.outcome(&outcome);
        Ingested::Outcome(outcome)
    }

    /// Pull payloads from `source` until it is exhausted; returns how many
    /// were validated
    pub fn drain<I>(&mut self, source: I) -> usize
    where
        I: IntoIterator<Item = RawPayload>,
    {
        let mut validated = 0;
        for raw in source {
            if let Ingested::Outcome(_) = self.ingest(raw) {
                validated += 1;
            }
        }
        validated
    }

    /// Consume `rx` until it closes or `shutdown` resolves, calling the
    /// sink's heartbeat every `heartbeat_every` when given. Returns the
    /// ingestor so the caller can report final state.
    pub async fn run<F>(
        mut self,
        mut rx: mpsc::Receiver<RawPayload>,
        heartbeat_every: Option<Duration>,
        shutdown: F,
    ) -> Self
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let period = heartbeat_every.unwrap_or(Duration::from_secs(3600));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Ingestor stopping on shutdown signal");
                    break;
                }
                received = rx.recv() => match received {
                    Some(raw) => {
                        self.ingest(raw);
                    }
                    None => {
                        info!("All frame sources closed");
                        break;
                    }
                },
                _ = ticker.tick(), if heartbeat_every.is_some() => {
                    self.sink.heartbeat();
                }
            }
        }

        self
    }
}
