use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::registry::BotConfig;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Exchange connection (account name, mode, gateway)
    pub exchange: ExchangeConfig,
    /// State snapshot directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Optional bot to create on startup if the registry is empty
    #[serde(default)]
    pub bot: Option<BotConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    /// Account name bots refer to
    pub account: String,
    /// Mode: "live" or "simulated"
    pub mode: String,
    /// Base URL of the order gateway
    pub base_url: String,
    /// Gateway API key
    /// In production, consider loading this from ENV variables only
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between tick rounds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
        }
    }
}

fn default_tick_interval() -> u64 {
    10
}

#[derive(Debug, Deserialize, Default)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment variables override the file,
            // e.g. APP_EXCHANGE__API_KEY=...
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
