use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    Load(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("listener port cannot be 0")]
    InvalidPort,

    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),

    #[error("store base_dir cannot be empty")]
    EmptyBaseDir,
}

/// Gateway configuration, loaded from a YAML file at startup and passed
/// into the ingestion endpoint and forwarder explicitly.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for inbound sensor payloads
    #[serde(default)]
    pub listener: Listener,
    /// Downstream collector that queued payloads are relayed to
    pub upstream: Upstream,
    /// On-disk queue location and completion policy
    pub store: Store,
    /// Forwarding loop timing
    #[serde(default)]
    pub forwarder: Forwarder,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.store.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBaseDir);
        }
        if self.listener.read_timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval("listener.read_timeout_secs"));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval("upstream.timeout_secs"));
        }
        if self.forwarder.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("forwarder.poll_interval_secs"));
        }
        if self.forwarder.retry_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("forwarder.retry_interval_secs"));
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "::")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// Deadline for reading one request body; a sender that declares a
    /// length and then stalls gets a client error instead of parking the
    /// handler indefinitely.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Listener {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8081,
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

/// Downstream collector configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Upstream {
    /// Base URL of the collector; the origin address is appended as an
    /// `ip` query parameter on each relay request.
    pub url: Url,
    /// HTTP method used for relay requests
    #[serde(default)]
    pub method: Method,
    /// Per-attempt request timeout; an attempt that exceeds it counts as
    /// a failure and the entry is retried.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Upstream {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Post,
    Put,
}

/// Durable queue configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Store {
    /// Base directory holding the `queue/` and `archive/` subdirectories,
    /// created on demand.
    pub base_dir: PathBuf,
    /// What happens to an entry after successful delivery
    #[serde(default)]
    pub on_success: CompletionPolicy,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionPolicy {
    /// Keep delivered entries under `archive/` for audit
    #[default]
    Archive,
    /// Remove delivered entries outright
    Delete,
}

/// Forwarding loop timing. Both intervals are fixed; retry never backs
/// off and never gives up on an entry.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Forwarder {
    /// Sleep between queue scans while the queue is empty
    #[serde(default = "default_interval_secs")]
    pub poll_interval_secs: u64,
    /// Sleep after a failed delivery attempt before retrying
    #[serde(default = "default_interval_secs")]
    pub retry_interval_secs: u64,
}

impl Forwarder {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Forwarder {
            poll_interval_secs: default_interval_secs(),
            retry_interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    30
}
