use seatline_core::{HoldPolicy, SystemClock};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub seating: SeatingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Without a `url` the service falls back to the in-memory store.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
    #[serde(default = "default_release_topic")]
    pub release_topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: None,
            release_topic: default_release_topic(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeatingConfig {
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// IANA zone name used when rendering timestamps.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: default_hold_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            time_zone: default_time_zone(),
        }
    }
}

impl SeatingConfig {
    pub fn hold_policy(&self) -> HoldPolicy {
        HoldPolicy::from_seconds(self.hold_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn clock(&self) -> Result<SystemClock, config::ConfigError> {
        SystemClock::from_zone_name(&self.time_zone).map_err(config::ConfigError::Message)
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_release_topic() -> String { "seating.holds.released".to_string() }
fn default_hold_ttl() -> u64 { 90 }
fn default_sweep_interval() -> u64 { 60 }
fn default_time_zone() -> String { "UTC".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SEATLINE__SEATING__HOLD_TTL_SECONDS=120`
            .add_source(config::Environment::with_prefix("SEATLINE").separator("__"));

        Self::from_builder(builder)
    }

    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.seating.hold_ttl_seconds == 0 {
            return Err(config::ConfigError::Message("seating.hold_ttl_seconds must be positive".into()));
        }
        if self.seating.sweep_interval_seconds == 0 {
            return Err(config::ConfigError::Message("seating.sweep_interval_seconds must be positive".into()));
        }
        self.seating.clock()?;
        Ok(())
    }
}
