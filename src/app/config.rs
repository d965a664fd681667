use crate::connection::BackoffConfig;
use crate::queue::OverflowPolicy;
use crate::resolver::ServerSpec;
use crate::shipper::ShipperConfig;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Collector endpoint: host:port, or a bare name for DNS SRV discovery
    #[arg(long, env = "LOGSHIP_SERVER", default_value = "localhost:5044")]
    pub server: String,

    /// Capacity of the pending-event queue
    #[arg(long, env = "LOGSHIP_QUEUE_CAPACITY", default_value = "10000")]
    pub queue_capacity: usize,

    /// What to do with a new event when the queue is full
    #[arg(
        long,
        env = "LOGSHIP_OVERFLOW_POLICY",
        value_enum,
        default_value = "evict-oldest"
    )]
    pub overflow_policy: OverflowPolicy,

    /// Initial reconnect backoff in milliseconds
    #[arg(long, env = "LOGSHIP_BACKOFF_INITIAL_MS", default_value = "500")]
    pub backoff_initial_ms: u64,

    /// Maximum reconnect backoff in milliseconds
    #[arg(long, env = "LOGSHIP_BACKOFF_MAX_MS", default_value = "30000")]
    pub backoff_max_ms: u64,

    /// Disable backoff jitter (predictable delays, for testing)
    #[arg(long, env = "LOGSHIP_NO_JITTER")]
    pub no_jitter: bool,

    /// Seconds between endpoint re-resolutions
    #[arg(long, env = "LOGSHIP_RESOLUTION_INTERVAL_SECS", default_value = "30")]
    pub resolution_interval_secs: u64,

    /// TCP connect timeout in seconds
    #[arg(long, env = "LOGSHIP_CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub connect_timeout_secs: u64,

    /// Grace period for draining the queue at shutdown, in seconds
    #[arg(long, env = "LOGSHIP_SHUTDOWN_GRACE_SECS", default_value = "4")]
    pub shutdown_grace_secs: u64,

    /// Log level
    #[arg(long, env = "LOGSHIP_LOG_LEVEL", value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Enable the Prometheus metrics endpoint
    #[arg(long, env = "LOGSHIP_ENABLE_METRICS")]
    pub enable_metrics: bool,

    /// Metrics export port
    #[arg(long, env = "LOGSHIP_METRICS_PORT", default_value = "9090")]
    pub metrics_port: u16,

    /// Configuration file path (optional, TOML; replaces CLI values)
    #[arg(long, env = "LOGSHIP_CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "localhost:5044".to_string(),
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::EvictOldest,
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
            no_jitter: false,
            resolution_interval_secs: 30,
            connect_timeout_secs: 10,
            shutdown_grace_secs: 4,
            log_level: LogLevel::Info,
            enable_metrics: false,
            metrics_port: 9090,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Self::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ServerSpec::parse(&self.server)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.queue_capacity > 100_000_000 {
            return Err(ConfigError::InvalidConfig(
                "queue_capacity is unreasonably large".to_string(),
            ));
        }
        if self.backoff_initial_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "backoff_initial_ms must be positive".to_string(),
            ));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(ConfigError::InvalidConfig(
                "backoff_max_ms must be >= backoff_initial_ms".to_string(),
            ));
        }
        if self.resolution_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "resolution_interval_secs must be positive".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Finalizes the delivery-engine configuration. Called once, before
    /// start; the running shipper has no mutators.
    pub fn shipper_config(&self) -> ShipperConfig {
        ShipperConfig {
            server_spec: self.server.clone(),
            queue_capacity: self.queue_capacity,
            overflow_policy: self.overflow_policy,
            backoff: BackoffConfig {
                initial: Duration::from_millis(self.backoff_initial_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                jitter: !self.no_jitter,
            },
            resolution_interval: Duration::from_secs(self.resolution_interval_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}
