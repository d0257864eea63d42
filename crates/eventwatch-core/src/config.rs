//! eventwatch.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::Schedule;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub watcher: WatchConfig,
    pub eventing: EventingConfig,
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Backlog size above which a function is reported as breaching.
    pub backlog_threshold: u64,
    /// Pass schedule: a duration ("30s", "5m") or a cron expression.
    pub schedule: String,
    /// Maximum number of functions checked concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventingConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Transport selector: 0 = none, 1 = Slack, 2 = Teams.
    pub transport: u8,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_timeout() -> String {
    "10s".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/eventwatch/status.redb")
}

/// Which webhook flavour alerts are delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransport {
    None,
    Slack,
    Teams,
}

impl AlertTransport {
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0 => Some(AlertTransport::None),
            1 => Some(AlertTransport::Slack),
            2 => Some(AlertTransport::Teams),
            _ => None,
        }
    }
}

impl AlertsConfig {
    /// The selected transport, or `None` for an unknown selector.
    pub fn transport(&self) -> Option<AlertTransport> {
        AlertTransport::from_selector(self.transport)
    }
}

impl WatcherConfig {
    /// Read, parse, and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = self.alerts.transport().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "alerts.transport must be 0, 1 or 2 (got {})",
                self.alerts.transport
            ))
        })?;

        if transport != AlertTransport::None
            && self.alerts.webhook_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Invalid(
                "alerts.webhook_url is required when alerts.transport is not 0".to_string(),
            ));
        }

        self.schedule()?;

        if self.watcher.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "watcher.concurrency must be at least 1".to_string(),
            ));
        }

        if self.eventing.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("eventing.base_url is empty".to_string()));
        }

        if parse_duration(&self.eventing.timeout).is_none() {
            return Err(ConfigError::Invalid(format!(
                "eventing.timeout is not a duration: {:?}",
                self.eventing.timeout
            )));
        }

        Ok(())
    }

    /// The pass schedule parsed from `watcher.schedule`.
    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        Schedule::parse(&self.watcher.schedule)
    }

    /// Per-request timeout for the eventing API, defaulting to 10s.
    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.eventing.timeout).unwrap_or(Duration::from_secs(10))
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// Plain numbers are seconds. Values that overflow are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse::<u64>().ok().map(Duration::from_millis);
    }
    let (digits, unit_secs) = if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else {
        (s, 1)
    };
    let n = digits.parse::<u64>().ok()?;
    n.checked_mul(unit_secs).map(Duration::from_secs)
}
