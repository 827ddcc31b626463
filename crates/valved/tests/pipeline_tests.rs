//! Pipeline tests: config file -> TCP frames -> ingestor -> sink.

use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use valve_common::{Anomaly, DecodeError, RawPayload, ValidationOutcome, ValveState};
use valved::config::Config;
use valved::ingest::Ingestor;
use valved::report::{LogReporter, OutcomeSink};
use valved::transport;

#[derive(Default)]
struct Recorder {
    outcomes: Vec<ValidationOutcome>,
    failures: Vec<DecodeError>,
    heartbeats: usize,
}

impl OutcomeSink for Recorder {
    fn outcome(&mut self, outcome: &ValidationOutcome) {
        self.outcomes.push(outcome.clone());
    }

    fn decode_failed(&mut self, _raw: &RawPayload, error: &DecodeError) {
        self.failures.push(error.clone());
    }

    fn heartbeat(&mut self) {
        self.heartbeats += 1;
    }
}

const SCENARIO: &str = concat!(
    "sensors/valves/v1\t{\"id\":1,\"valve_id\":\"v1\",\"value\":\"closed\",\"timestamp\":100}\n",
    "sensors/valves/v1\t{\"id\":2,\"valve_id\":\"v1\",\"value\":\"opened\",\"timestamp\":101}\n",
    "sensors/valves/v1\t{\"id\":4,\"valve_id\":\"v1\",\"value\":\"closed\",\"timestamp\":102}\n",
);

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[validator]\nstale_threshold = 1.5\n\n[daemon]\nstats_interval_secs = 0").unwrap();

    let config = Config::load_from_path(file.path()).unwrap();
    assert_eq!(config.validator.stale_threshold, 1.5);
    assert_eq!(config.daemon.stats_interval_secs, 0);
    assert_eq!(config.daemon.topic_filter, "sensors/valves/+");
}

#[test]
fn test_load_config_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load_from_path(dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_invalid_config_at_lookup_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("config.toml");
    let fallback = dir.path().join("fallback.toml");
    std::fs::write(&primary, "[validator]\nstale_threshold = -1.0\n").unwrap();
    std::fs::write(&fallback, "[validator]\nstale_threshold = 3.0\n").unwrap();

    let err = Config::load_first([primary.as_path(), fallback.as_path()]).unwrap_err();
    assert!(format!("{:#}", err).contains("stale_threshold"));
}

#[test]
fn test_unparseable_config_at_lookup_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("config.toml");
    std::fs::write(&primary, "[validator\nstale_threshold = 2").unwrap();

    assert!(Config::load_first([primary.as_path()]).is_err());
}

#[test]
fn test_missing_lookup_path_falls_through() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("absent.toml");
    let fallback = dir.path().join("fallback.toml");
    std::fs::write(&fallback, "[validator]\nstale_threshold = 3.0\n").unwrap();

    let config = Config::load_first([primary.as_path(), fallback.as_path()]).unwrap();
    assert_eq!(config.validator.stale_threshold, 3.0);
}

#[test]
fn test_no_config_found_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("a.toml");
    let fallback = dir.path().join("b.toml");

    let config = Config::load_first([primary.as_path(), fallback.as_path()]).unwrap();
    assert_eq!(config.validator.stale_threshold, 5.0);
}

#[test]
fn test_save_default_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    Config::save_default(&path).unwrap();
    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.validator.stale_threshold, 5.0);
    assert_eq!(config.daemon.listen_addr, "127.0.0.1:7883");
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_scenario_through_ingestor() {
    let mut ingestor = Ingestor::new(Default::default(), "sensors/valves/+", LogReporter::new());
    let frames: Vec<RawPayload> = SCENARIO
        .lines()
        .map(|line| transport::parse_frame(line.as_bytes()).unwrap().unwrap())
        .collect();

    assert_eq!(ingestor.drain(frames), 3);

    let stats = ingestor.sink().stats();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.flagged, 1);
    assert_eq!(stats.anomalies.get("sequence_gap"), Some(&1));
}

#[tokio::test]
async fn test_tcp_frames_reach_validator() {
    let listener = transport::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let server = tokio::spawn(transport::listen(listener, tx));

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(SCENARIO.as_bytes()).await.unwrap();
    client.write_all(b"sensors/valves/v2\tnot json\n").await.unwrap();
    client.shutdown().await.unwrap();

    let mut ingestor = Ingestor::new(Default::default(), "sensors/valves/+", Recorder::default());
    for _ in 0..4 {
        let raw = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame not delivered in time")
            .expect("channel closed");
        ingestor.ingest(raw);
    }
    server.abort();

    let sink = ingestor.sink();
    assert_eq!(sink.outcomes.len(), 3);
    assert!(sink.outcomes[0].accepted);
    assert!(sink.outcomes[1].accepted);
    assert_eq!(
        sink.outcomes[2].anomalies,
        vec![Anomaly::SequenceGap { expected: 3, got: 4 }]
    );
    assert_eq!(sink.outcomes[2].state, ValveState::Closed);
    assert!(matches!(sink.failures.as_slice(), [DecodeError::Malformed(_)]));
    assert!(!ingestor.validator().registry().contains("v2"));
}

/// Signals the test every time an outcome arrives
struct Notifier {
    seen: mpsc::UnboundedSender<String>,
}

impl OutcomeSink for Notifier {
    fn outcome(&mut self, outcome: &ValidationOutcome) {
        let _ = self.seen.send(outcome.device_id.clone());
    }

    fn decode_failed(&mut self, _raw: &RawPayload, _error: &DecodeError) {}
}

#[tokio::test]
async fn test_two_connections_share_one_registry() {
    let listener = transport::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(16);
    let server = tokio::spawn(transport::listen(listener, tx));

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let consumer = tokio::spawn(
        Ingestor::new(Default::default(), "sensors/valves/+", Notifier { seen: seen_tx }).run(
            rx,
            None,
            async move {
                let _ = stop_rx.await;
            },
        ),
    );

    for (valve, state) in [("a", "opened"), ("b", "faulty")] {
        let mut client = TcpStream::connect(addr).await.unwrap();
        let frame = format!(
            "sensors/valves/{v}\t{{\"id\":1,\"valve_id\":\"{v}\",\"value\":\"{s}\",\"timestamp\":1.0}}\n",
            v = valve,
            s = state
        );
        client.write_all(frame.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..2 {
        let valve = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("outcome not produced in time")
            .expect("consumer stopped early");
        seen.push(valve);
    }
    seen.sort();
    assert_eq!(seen, vec!["a", "b"]);

    stop_tx.send(()).unwrap();
    let ingestor = consumer.await.unwrap();
    server.abort();

    let registry = ingestor.validator().registry();
    assert_eq!(registry.device_ids(), vec!["a", "b"]);
    assert_eq!(registry.get("a").unwrap().state(), ValveState::Opened);
    assert_eq!(registry.get("b").unwrap().state(), ValveState::Faulty);
}

#[tokio::test]
async fn test_run_calls_heartbeat() {
    let (tx, rx) = mpsc::channel::<RawPayload>(1);
    let ingestor = Ingestor::new(Default::default(), "sensors/valves/+", Recorder::default());

    let ingestor = ingestor
        .run(
            rx,
            Some(Duration::from_millis(10)),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;
    drop(tx);

    assert!(ingestor.sink().heartbeats >= 1);
}
