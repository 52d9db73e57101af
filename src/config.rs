//! # Configuration Module
//!
//! Handles loading and validating process configuration from TOML files.
//!
//! Data settings that the operator changes at runtime (window size, read
//! interval, data lifespan) are not part of this file; they live in the JSON
//! file owned by [`crate::settings::SettingsStore`].

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};

/// Upper bound on the number of tubes a rig can have
pub const MAX_TUBES: u8 = 16;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub rig: RigConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rig layout
#[derive(Debug, Deserialize, Clone)]
pub struct RigConfig {
    #[serde(default = "default_tube_count")]
    pub tube_count: u8,

    /// Tubes whose actuators are on at startup
    #[serde(default = "default_enabled_tubes")]
    pub enabled_tubes: Vec<u8>,
}

/// File locations
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    #[serde(default = "default_read_intervals_file")]
    pub read_intervals_file: String,

    #[serde(default = "default_data_lifespans_file")]
    pub data_lifespans_file: String,

    #[serde(default = "default_stakeholders_file")]
    pub stakeholders_file: String,
}

/// Alert thresholds
#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdConfig {
    #[serde(default = "default_ph_low")]
    pub ph_low: f64,

    #[serde(default = "default_ph_high")]
    pub ph_high: f64,

    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,

    /// Per-tube temperature ceilings for tubes running a different culture
    #[serde(default)]
    pub overrides: Vec<TubeThreshold>,
}

/// Temperature ceiling for a single tube
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TubeThreshold {
    pub tube: u8,
    pub temperature_max: f64,
}

/// Alert mail configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_alerts_enabled")]
    pub enabled: bool,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub sender: String,

    /// Environment variable holding the sender password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Prefix every mail with "Hello {name},"
    #[serde(default = "default_greeting")]
    pub greeting: bool,

    /// Seconds before a tube that stays unhealthy is reported again; 0 reports
    /// it on every unhealthy tick. A newly unhealthy tube is always reported.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the daily rolling log file; empty logs to stdout only
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

// Default value functions
fn default_tube_count() -> u8 { 6 }
fn default_enabled_tubes() -> Vec<u8> { (1..=default_tube_count()).collect() }

fn default_data_dir() -> String { "./data".to_string() }
fn default_settings_file() -> String { "./assets/settings/data_settings.json".to_string() }
fn default_read_intervals_file() -> String { "./assets/lookup/read_intervals.json".to_string() }
fn default_data_lifespans_file() -> String { "./assets/lookup/data_lifespans.json".to_string() }
fn default_stakeholders_file() -> String { "./assets/stakeholders.csv".to_string() }

fn default_ph_low() -> f64 { 7.0 }
fn default_ph_high() -> f64 { 8.0 }
fn default_temperature_max() -> f64 { 30.0 }

fn default_alerts_enabled() -> bool { true }
fn default_smtp_host() -> String { "smtp.gmail.com".to_string() }
fn default_smtp_port() -> u16 { 587 }
fn default_password_env() -> String { "BIOREACTOR_SMTP_PASSWORD".to_string() }
fn default_subject() -> String { "Bioreactor alert".to_string() }
fn default_greeting() -> bool { true }
fn default_cooldown_secs() -> u64 { 300 }

fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            tube_count: default_tube_count(),
            enabled_tubes: default_enabled_tubes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            settings_file: default_settings_file(),
            read_intervals_file: default_read_intervals_file(),
            data_lifespans_file: default_data_lifespans_file(),
            stakeholders_file: default_stakeholders_file(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            ph_low: default_ph_low(),
            ph_high: default_ph_high(),
            temperature_max: default_temperature_max(),
            overrides: Vec::new(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: default_alerts_enabled(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            sender: String::new(),
            password_env: default_password_env(),
            subject: default_subject(),
            greeting: default_greeting(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
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
    /// use bioreactor_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Rig layout
        if self.rig.tube_count == 0 || self.rig.tube_count > MAX_TUBES {
            return Err(invalid(format!("tube_count must be between 1 and {}", MAX_TUBES)));
        }

        for &tube in &self.rig.enabled_tubes {
            if tube == 0 || tube > self.rig.tube_count {
                return Err(invalid(format!(
                    "enabled_tubes entry {} is out of bounds (must be 1-{})",
                    tube, self.rig.tube_count
                )));
            }
        }

        // Storage paths
        for (name, value) in [
            ("data_dir", &self.storage.data_dir),
            ("settings_file", &self.storage.settings_file),
            ("read_intervals_file", &self.storage.read_intervals_file),
            ("data_lifespans_file", &self.storage.data_lifespans_file),
            ("stakeholders_file", &self.storage.stakeholders_file),
        ] {
            if value.is_empty() {
                return Err(invalid(format!("{} cannot be empty", name)));
            }
        }

        // Thresholds
        let t = &self.thresholds;
        if !t.ph_low.is_finite() || !t.ph_high.is_finite() || !t.temperature_max.is_finite() {
            return Err(invalid("thresholds must be finite numbers"));
        }

        if t.ph_low < 0.0 || t.ph_high > 14.0 {
            return Err(invalid("pH band must lie within 0-14"));
        }

        if t.ph_low > t.ph_high {
            return Err(invalid("ph_low must not be greater than ph_high"));
        }

        for o in &t.overrides {
            if o.tube == 0 || o.tube > self.rig.tube_count {
                return Err(invalid(format!(
                    "threshold override for tube {} is out of bounds (must be 1-{})",
                    o.tube, self.rig.tube_count
                )));
            }
            if !o.temperature_max.is_finite() {
                return Err(invalid(format!("temperature_max for tube {} must be finite", o.tube)));
            }
        }

        // Alerts
        if self.alerts.enabled {
            if self.alerts.smtp_host.is_empty() {
                return Err(invalid("smtp_host cannot be empty when alerts are enabled"));
            }
            if self.alerts.smtp_port == 0 {
                return Err(invalid("smtp_port must be greater than 0"));
            }
            if !self.alerts.sender.contains('@') {
                return Err(invalid("sender must be an e-mail address when alerts are enabled"));
            }
            if self.alerts.password_env.is_empty() {
                return Err(invalid("password_env cannot be empty when alerts are enabled"));
            }
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
