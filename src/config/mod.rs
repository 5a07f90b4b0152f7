use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

pub mod app;
pub mod pipeline;

pub use app::AppConfig;
pub use pipeline::{OverlayConfig, PipelineConfig, ReplayConfig, StreamConfig};

/// Event log settings
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Events kept per session before the oldest are dropped
    pub capacity: usize,
}

impl EventLogConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            capacity: env_or("EVENT_LOG_CAPACITY", 10_000usize)?.max(1),
        })
    }
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub app: AppConfig,
    pub pipeline: PipelineConfig,
    pub stream: StreamConfig,
    pub replay: ReplayConfig,
    pub event_log: EventLogConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            app: AppConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
            stream: StreamConfig::from_env()?,
            replay: ReplayConfig::from_env()?,
            event_log: EventLogConfig::from_env()?,
        })
    }
}

/// Read an environment variable, falling back to `default` when unset
pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, value)),
        Err(_) => Ok(default),
    }
}
