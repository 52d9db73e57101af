//! # Error Types
//!
//! Custom error types for the bioreactor telemetry pipeline using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Settings and lookup table JSON errors
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// Settings values that parse but make no sense
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A settings label with no entry in its lookup table
    #[error("Unknown {table} key: {key:?}")]
    UnknownKey { table: &'static str, key: String },

    /// CSV encoding and decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sample could not be written to its CSV file
    #[error("Failed to record to {}: {source}", path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sensor collaborator could not produce a reading
    #[error("Sensor error on tube {tube}: {reason}")]
    Sensor { tube: u8, reason: String },

    /// Tube id outside 1..=tube_count
    #[error("Tube {0} is out of range")]
    InvalidTube(u8),

    /// Sender credentials rejected by the mail server
    #[error("Mail authentication failed: {0}")]
    MailAuth(String),

    /// Composing or sending a single mail failed
    #[error("Mail error: {0}")]
    Mail(String),

    /// The scheduler task is no longer accepting commands
    #[error("Telemetry scheduler is not running")]
    SchedulerStopped,
}

/// Result type alias for the telemetry pipeline
pub type Result<T> = std::result::Result<T, TelemetryError>;
