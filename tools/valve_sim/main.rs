//! Valve Simulator - publishes telemetry for one valve to a running valved
//!
//! Usage:
//!   valve_sim --valve-id v1
//!   valve_sim --valve-id v2 --addr 127.0.0.1:7883 --interval-secs 0.5 --count 100
//!
//! Each tick sends one frame on `sensors/valves/<valve-id>`, occasionally
//! corrupted on purpose (wrong state, timestamp +20s, or repeated id) so the
//! daemon has something to catch.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info};
use tracing_subscriber::{fmt as log_fmt, EnvFilter};
use valve_common::topic::valve_topic;
use valve_common::{DeviceMessage, ValveMachine, ValveState};

/// Seconds added by a timestamp injection
const TIMESTAMP_SKEW_SECS: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(name = "valve_sim", version, about = "Valve telemetry simulator")]
struct Args {
    /// Valve id to publish as
    #[arg(long)]
    valve_id: String,

    /// valved frame listener
    #[arg(long, default_value = "127.0.0.1:7883")]
    addr: String,

    /// Seconds between messages
    #[arg(long, default_value_t = 1.0)]
    interval_secs: f64,

    /// 1-in-N chance of reporting a wrong state
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    chance_wrong_state: u32,

    /// 1-in-N chance of skewing the timestamp
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    chance_wrong_timestamp: u32,

    /// 1-in-N chance of repeating the previous id
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    chance_wrong_id: u32,

    /// 1-in-N chance per tick of the valve faulting
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    chance_faulty: u32,

    /// Seconds a faulty valve waits before resetting itself
    #[arg(long, default_value_t = 10.0)]
    fault_dwell_secs: f64,

    /// Stop after this many messages
    #[arg(long)]
    count: Option<u64>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

/// 1-in-N odds for each kind of misbehaviour
#[derive(Debug, Clone, Copy)]
struct Chances {
    wrong_state: u32,
    wrong_timestamp: u32,
    wrong_id: u32,
    faulty: u32,
}

/// Corruption applied to an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injection {
    WrongState,
    WrongTimestamp,
    WrongId,
}

impl fmt::Display for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Injection::WrongState => write!(f, "wrong state"),
            Injection::WrongTimestamp => write!(f, "wrong timestamp"),
            Injection::WrongId => write!(f, "wrong id"),
        }
    }
}

/// Device-side model of one valve
struct Simulator<R: Rng> {
    valve_id: String,
    machine: ValveMachine,
    next_id: i64,
    chances: Chances,
    rng: R,
}

impl<R: Rng> Simulator<R> {
    fn new(valve_id: impl Into<String>, chances: Chances, rng: R) -> Self {
        Self {
            valve_id: valve_id.into(),
            machine: ValveMachine::new(),
            next_id: 1,
            chances,
            rng,
        }
    }

    fn one_in(&mut self, n: u32) -> bool {
        self.rng.gen_range(0..n) == 0
    }

    /// Build the next message, possibly corrupted. At most one injection
    /// is applied per message.
    fn next_message(&mut self, now: f64) -> (DeviceMessage, Option<Injection>) {
        let state = self.machine.state();
        let mut message = DeviceMessage::new(self.next_id, self.valve_id.clone(), state, now);
        message.state = Some(state.label().to_string());
        self.next_id += 1;

        let injection = if self.one_in(self.chances.wrong_state) {
            let wrong: Vec<ValveState> =
                ValveState::ALL.iter().copied().filter(|s| *s != state).collect();
            if let Some(value) = wrong.choose(&mut self.rng) {
                message.reported_value = *value;
            }
            Some(Injection::WrongState)
        } else if self.one_in(self.chances.wrong_timestamp) {
            message.timestamp += TIMESTAMP_SKEW_SECS;
            Some(Injection::WrongTimestamp)
        } else if self.one_in(self.chances.wrong_id) {
            message.sequence_id = message.sequence_id.saturating_sub(1);
            Some(Injection::WrongId)
        } else {
            None
        };

        (message, injection)
    }

    /// Move to the next state. Returns true when the valve just faulted.
    /// A faulty valve stays put until `recover` is called.
    fn advance(&mut self) -> bool {
        if self.machine.state() == ValveState::Faulty {
            return false;
        }
        if self.one_in(self.chances.faulty) {
            self.machine.fault().is_ok()
        } else {
            // Cycle is legal from both operational states.
            let _ = self.machine.cycle();
            false
        }
    }

    fn recover(&mut self) {
        if self.machine.reset().is_ok() {
            info!("Valve {} auto reset to {}", self.valve_id, self.machine.state());
        }
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[tokio::main]
async fn main() -> Result<()> {
    log_fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args = Args::parse();
    if !(args.interval_secs.is_finite() && args.interval_secs > 0.0) {
        bail!("--interval-secs must be positive");
    }
    if !(args.fault_dwell_secs.is_finite() && args.fault_dwell_secs >= 0.0) {
        bail!("--fault-dwell-secs must be non-negative");
    }

    let chances = Chances {
        wrong_state: args.chance_wrong_state,
        wrong_timestamp: args.chance_wrong_timestamp,
        wrong_id: args.chance_wrong_id,
        faulty: args.chance_faulty,
    };
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut sim = Simulator::new(args.valve_id.clone(), chances, rng);

    let topic = valve_topic(&args.valve_id);
    let mut stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("connecting to {}", args.addr))?;
    info!("Connected to {} as {}", args.addr, topic);

    let period = Duration::from_secs_f64(args.interval_secs);
    let dwell = Duration::from_secs_f64(args.fault_dwell_secs);
    let mut ticker = interval_at(Instant::now() + period, period);

    let reset_timer = sleep(Duration::ZERO);
    tokio::pin!(reset_timer);
    let mut reset_armed = false;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl-C");
                break;
            }
            _ = &mut reset_timer, if reset_armed => {
                reset_armed = false;
                sim.recover();
            }
            _ = ticker.tick() => {
                let (message, injection) = sim.next_message(now_secs());
                if let Some(injection) = injection {
                    debug!("Injecting {}", injection);
                }

                let payload = serde_json::to_string(&message)?;
                stream
                    .write_all(format!("{}\t{}\n", topic, payload).as_bytes())
                    .await
                    .with_context(|| format!("publishing to {}", topic))?;
                info!("Sent {} to topic {}", payload, topic);
                sent += 1;

                if sim.advance() {
                    debug!("Faulty valve. Auto reset in {:?}", dwell);
                    reset_timer.as_mut().reset(Instant::now() + dwell);
                    reset_armed = true;
                }

                if matches!(args.count, Some(limit) if sent >= limit) {
                    break;
                }
            }
        }
    }

    stream.shutdown().await.ok();
    info!("Sent {} messages", sent);
    Ok(())
}
