//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::ecometer::measurement::ECOMETER_LEVEL_REFERENCE_CM;
use crate::ecometer::protocol::{ECOMETER_BAUD_RATE, ECOMETER_READ_TIMEOUT_MS};
use crate::error::{EcometerError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub tank: TankConfig,
    pub protocol: ProtocolConfig,
    pub telemetry: TelemetryConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Where the level computation measures from
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LevelReference {
    /// Fixed 190 cm, as computed by the display
    Fixed,
    /// Configured tank height plus sensor offset
    Configured,
}

/// Tank geometry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TankConfig {
    #[serde(default = "default_height_cm")]
    pub height_cm: i32,

    #[serde(default = "default_offset_cm")]
    pub offset_cm: i32,

    #[serde(default = "default_level_reference")]
    pub level_reference: LevelReference,
}

/// Protocol options
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub verify_crc: bool,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { ECOMETER_BAUD_RATE }
fn default_timeout_ms() -> u64 { ECOMETER_READ_TIMEOUT_MS }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_height_cm() -> i32 { 185 }
fn default_offset_cm() -> i32 { 5 }
fn default_level_reference() -> LevelReference { LevelReference::Fixed }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn config_error(msg: impl std::fmt::Display) -> EcometerError {
    EcometerError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ecometer_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(config_error("serial port cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200].contains(&self.serial.baud_rate) {
            return Err(config_error("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 60000 {
            return Err(config_error("timeout_ms must be between 1 and 60000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(config_error("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.tank.height_cm <= 0 {
            return Err(config_error("tank height_cm must be greater than 0"));
        }

        if self.tank.offset_cm < 0 {
            return Err(config_error("tank offset_cm cannot be negative"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(config_error("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(config_error("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(config_error("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }

    /// Build the read-only device settings used by the polling loop
    pub fn device(&self) -> DeviceConfiguration {
        DeviceConfiguration {
            port: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_millis(self.serial.timeout_ms),
            reconnect_interval: Duration::from_millis(self.serial.reconnect_interval_ms),
            tank_height_cm: self.tank.height_cm,
            offset_cm: self.tank.offset_cm,
            level_reference: self.tank.level_reference,
            verify_crc: self.protocol.verify_crc,
        }
    }
}

/// Settings fixed for the lifetime of a polling session
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfiguration {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub reconnect_interval: Duration,
    pub tank_height_cm: i32,
    pub offset_cm: i32,
    pub level_reference: LevelReference,
    pub verify_crc: bool,
}

impl DeviceConfiguration {
    /// Tank height plus sensor offset
    pub fn total_height_cm(&self) -> i32 {
        self.tank_height_cm + self.offset_cm
    }

    /// Height the measured distance is subtracted from
    pub fn level_reference_cm(&self) -> i32 {
        match self.level_reference {
            LevelReference::Fixed => ECOMETER_LEVEL_REFERENCE_CM,
            LevelReference::Configured => self.total_height_cm(),
        }
    }
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout: Duration::from_millis(default_timeout_ms()),
            reconnect_interval: Duration::from_millis(default_reconnect_interval_ms()),
            tank_height_cm: default_height_cm(),
            offset_cm: default_offset_cm(),
            level_reference: default_level_reference(),
            verify_crc: false,
        }
    }
}
