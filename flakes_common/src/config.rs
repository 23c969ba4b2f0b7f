//! Configuration loading traits and relay configuration types.
//!
//! The relay reads a single TOML file. Every section and every field is
//! optional; omitted values fall back to the reference deployment defaults
//! in [`crate::consts`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use flakes_common::config::{ConfigError, ConfigLoader, RelayConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = RelayConfig::load(Path::new("relay.toml"))?;
//!     config.validate()?;
//!     println!("Relay {} -> {}", config.network.relay_name, config.network.address());
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "flakes-relay-stage-left"
//!
//! [network]
//! host = "192.168.1.12"
//! port = 5466
//! relay_name = "SFR-01"
//! heartbeat_interval_s = 5
//! connect_timeout_ms = 2000
//!
//! [timing]
//! fps = 60
//! ups = 25
//! tick_interval_us = 50
//!
//! [outputs]
//! channel_count = 17
//! driver = "simulation"
//! ```

use crate::consts::{
    DEFAULT_CHANNEL_COUNT, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DRIVER, DEFAULT_FPS,
    DEFAULT_HEARTBEAT_INTERVAL_S, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RELAY_NAME,
    DEFAULT_SERVICE_NAME, DEFAULT_TICK_INTERVAL_US, DEFAULT_UPS, MAX_CHANNELS, MAX_RATE_HZ,
    MAX_RELAY_NAME_LEN,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common fields shared by every relay instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier, logged when the relay core is created.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Controller link settings (`[network]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Controller host name or IP address.
    pub host: String,
    /// Controller TCP port.
    pub port: u16,
    /// Identifier sent in the handshake.
    pub relay_name: String,
    /// Liveness window in seconds.
    pub heartbeat_interval_s: u32,
    /// Upper bound for one connection attempt in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            relay_name: DEFAULT_RELAY_NAME.to_string(),
            heartbeat_interval_s: DEFAULT_HEARTBEAT_INTERVAL_S,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl NetworkConfig {
    /// `host:port` string used for address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection attempt bound as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "network.host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "network.port must be greater than 0".to_string(),
            ));
        }
        validate_relay_name(&self.relay_name)?;
        if self.heartbeat_interval_s == 0 {
            return Err(ConfigError::ValidationError(
                "network.heartbeat_interval_s must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduler rates (`[timing]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Output frames per second.
    pub fps: u32,
    /// Network update ticks per second.
    pub ups: u32,
    /// Minimum sleep between scheduler ticks in microseconds.
    pub tick_interval_us: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            ups: DEFAULT_UPS,
            tick_interval_us: DEFAULT_TICK_INTERVAL_US,
        }
    }
}

impl TimingConfig {
    /// Length of one output frame.
    pub fn frame_period(&self) -> Duration {
        period_from_rate(self.fps)
    }

    /// Length of one update tick.
    pub fn update_period(&self) -> Duration {
        period_from_rate(self.ups)
    }

    /// Minimum sleep between scheduler ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(self.tick_interval_us)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, rate) in [("fps", self.fps), ("ups", self.ups)] {
            if rate == 0 || rate > MAX_RATE_HZ {
                return Err(ConfigError::ValidationError(format!(
                    "timing.{name} must be in 1..={MAX_RATE_HZ} (got {rate})"
                )));
            }
        }
        if self.tick_interval_us == 0 {
            return Err(ConfigError::ValidationError(
                "timing.tick_interval_us must be greater than 0".to_string(),
            ));
        }
        if self.tick_interval() >= self.frame_period() {
            return Err(ConfigError::ValidationError(format!(
                "timing.tick_interval_us ({}) must be shorter than the frame period ({}us)",
                self.tick_interval_us,
                self.frame_period().as_micros()
            )));
        }
        Ok(())
    }
}

/// Output bank settings (`[outputs]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Number of channels in the bank.
    pub channel_count: usize,
    /// Output driver name (see the relay's driver registry).
    pub driver: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNEL_COUNT,
            driver: DEFAULT_DRIVER.to_string(),
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ConfigError::ValidationError(format!(
                "outputs.channel_count must be in 1..={MAX_CHANNELS} (got {})",
                self.channel_count
            )));
        }
        if self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "outputs.driver cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Common settings.
    pub shared: SharedConfig,
    /// Controller link settings.
    pub network: NetworkConfig,
    /// Scheduler rates.
    pub timing: TimingConfig,
    /// Output bank settings.
    pub outputs: OutputConfig,
}

impl RelayConfig {
    /// Validate every section.
    ///
    /// # Validation Rules
    /// 1. `service_name`, `host`, `driver` are non-empty
    /// 2. `port`, `heartbeat_interval_s`, `connect_timeout_ms` > 0
    /// 3. `relay_name` is non-empty ASCII without NUL, at most `MAX_RELAY_NAME_LEN` bytes
    /// 4. `fps`, `ups` in `1..=MAX_RATE_HZ`
    /// 5. `tick_interval_us` > 0 and shorter than one frame
    /// 6. `channel_count` in `1..=MAX_CHANNELS`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.network.validate()?;
        self.timing.validate()?;
        self.outputs.validate()?;
        Ok(())
    }

    /// Number of update ticks in one liveness window (`ups * heartbeat_interval_s`).
    pub fn heartbeat_ticks(&self) -> u32 {
        self.timing
            .ups
            .saturating_mul(self.network.heartbeat_interval_s)
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Check a relay identifier for use in the handshake.
pub fn validate_relay_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::ValidationError(
            "network.relay_name cannot be empty".to_string(),
        ));
    }
    if !name.is_ascii() || name.bytes().any(|b| b == 0) {
        return Err(ConfigError::ValidationError(format!(
            "network.relay_name must be ASCII without NUL bytes (got {name:?})"
        )));
    }
    if name.len() > MAX_RELAY_NAME_LEN {
        return Err(ConfigError::ValidationError(format!(
            "network.relay_name is {} bytes (max {MAX_RELAY_NAME_LEN})",
            name.len()
        )));
    }
    Ok(())
}

fn period_from_rate(rate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(rate.max(1)))
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}
