//! Configuration Module
//!
//! TOML-based configuration for the dispatch core:
//! - Logging level
//! - Dispatch policies (unsubscribe matching, QoS reconciliation)
//! - Fan-out limits (concurrent sends, per-send timeout)
//! - Feature switches (retained messages, topic depth)
//! - Environment variable overrides (BROKE__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use serde::Deserialize;

use crate::broker::QosPolicy;
use crate::topic::UnsubscribeMode;


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Config(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Dispatch configuration
    pub dispatch: DispatchConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Dispatch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Which subscriptions an UNSUBSCRIBE removes
    pub unsubscribe_mode: UnsubscribeMode,
    /// How outbound QoS is derived
    pub qos_policy: QosPolicy,
    /// Maximum sends in flight per publish (0 = unbounded)
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Bound on a single send, e.g. "5s" or "250ms" (0s = no bound)
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Whether retained messages are stored and replayed
    #[serde(default = "default_true")]
    pub retain_available: bool,
    /// Maximum topic levels accepted (0 = unlimited)
    pub max_topic_levels: usize,
}

fn default_max_concurrent_sends() -> usize {
    64
}
fn default_send_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_true() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            unsubscribe_mode: UnsubscribeMode::default(),
            qos_policy: QosPolicy::default(),
            max_concurrent_sends: default_max_concurrent_sends(),
            send_timeout: default_send_timeout(),
            retain_available: true,
            max_topic_levels: 0,
        }
    }
}

impl DispatchConfig {
    /// Per-send timeout, or `None` when sends are unbounded
    pub fn send_timeout_bound(&self) -> Option<Duration> {
        (!self.send_timeout.is_zero()).then_some(self.send_timeout)
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file yields the defaults. Overrides use the `BROKE__` prefix
    /// with double underscores for nesting:
    ///    - `BROKE__LOG__LEVEL=debug` overrides `log.level`
    ///    - `BROKE__DISPATCH__SEND_TIMEOUT=1s` overrides `dispatch.send_timeout`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("dispatch.unsubscribe_mode", "by_topic_and_channel")?
            .set_default("dispatch.qos_policy", "minimum")?
            .set_default("dispatch.max_concurrent_sends", 64)?
            .set_default("dispatch.send_timeout", "5s")?
            .set_default("dispatch.retain_available", true)?
            .set_default("dispatch.max_topic_levels", 0)?;

        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                builder = builder.add_source(File::from_str(&content, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("BROKE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults and environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.log.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "log.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log.level
            )));
        }
        Ok(())
    }
}
