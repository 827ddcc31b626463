//! Configuration management for valved.
//!
//! Loads settings from /etc/valved/config.toml or uses defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};
use valve_common::topic::{is_valid_filter, ALL_VALVES_FILTER};
use valve_common::ValidatorConfig;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/valved/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/valved/config.toml";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the frame listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Subscription filter; frames on other topics are dropped
    #[serde(default = "default_topic_filter")]
    pub topic_filter: String,

    /// Frames buffered between connections and the validator
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How often running stats are logged, in seconds (0 disables)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:7883".to_string()
}

fn default_topic_filter() -> String {
    ALL_VALVES_FILTER.to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_stats_interval() -> u64 {
    60
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            topic_filter: default_topic_filter(),
            channel_capacity: default_channel_capacity(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl Config {
    /// Load config from the standard locations, or return defaults when
    /// neither file exists. A file that exists but fails to read, parse or
    /// check is an error.
    pub fn load() -> Result<Self> {
        Self::load_first([Path::new(CONFIG_PATH), Path::new(DEFAULT_CONFIG_PATH)])
    }

    /// Load the first candidate that exists
    pub fn load_first<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Result<Self> {
        for path in candidates {
            match fs::read_to_string(path) {
                Ok(content) => return Self::from_content(path, &content),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
            }
        }
        warn!("Config not found, using defaults");
        Ok(Config::default())
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_content(path, &content)
    }

    fn from_content(path: &Path, content: &str) -> Result<Self> {
        let config = Self::parse(content)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and check a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn check(&self) -> Result<()> {
        let threshold = self.validator.stale_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            bail!("validator.stale_threshold must be a non-negative number, got {}", threshold);
        }
        if !is_valid_filter(&self.daemon.topic_filter) {
            bail!("daemon.topic_filter is not a valid filter: {:?}", self.daemon.topic_filter);
        }
        if self.daemon.channel_capacity == 0 {
            bail!("daemon.channel_capacity must be at least 1");
        }
        Ok(())
    }

    /// Save default config to path (for init)
    pub fn save_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }
}
