//! Sample and reading types shared by the pipeline.

use chrono::NaiveDateTime;

/// Tube number, 1-based
pub type TubeId = u8;

/// One raw reading from a tube's sensors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub ph: f64,
    /// Degrees Celsius
    pub temperature: f64,
}

impl Reading {
    pub fn new(ph: f64, temperature: f64) -> Self {
        Self { ph, temperature }
    }
}

/// A reading stamped with the local wall-clock time of its tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub ph: f64,
    pub temperature: f64,
}

impl Sample {
    pub fn new(timestamp: NaiveDateTime, reading: Reading) -> Self {
        Self {
            timestamp,
            ph: reading.ph,
            temperature: reading.temperature,
        }
    }

    /// Placeholder used to backfill a freshly enabled tube's chart
    pub fn zeroed(timestamp: NaiveDateTime) -> Self {
        Self::new(timestamp, Reading::new(0.0, 0.0))
    }
}
