//! Tracing subscriber setup
//!
//! The dispatch core only emits `tracing` events. Embedders that don't
//! install their own subscriber can call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Error installing the global subscriber
pub type LogError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install a compact fmt subscriber filtered at the configured level
///
/// `RUST_LOG` directives, when set, take precedence over the configured
/// level. Fails if a global subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), LogError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.level.to_lowercase())?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .compact()
        .try_init()
}
