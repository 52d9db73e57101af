//! Randomised stand-in for the rig's probes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

use crate::error::{Result, TelemetryError};
use crate::telemetry::sample::{Reading, TubeId};

use super::SensorSource;

/// Default pH range; straddles the 7-8 healthy band
pub const DEFAULT_PH_RANGE: Range<f64> = 6.8..8.2;

/// Default temperature range in °C; straddles the 30 °C ceiling
pub const DEFAULT_TEMPERATURE_RANGE: Range<f64> = 24.0..31.0;

/// Draws uniformly distributed readings for every enabled tube
#[derive(Debug)]
pub struct SimulatedSensor {
    rng: StdRng,
    ph_range: Range<f64>,
    temperature_range: Range<f64>,
    enabled: Vec<bool>,
}

impl SimulatedSensor {
    /// Create a sensor for tubes `1..=tube_count`, all enabled
    pub fn new(tube_count: usize) -> Self {
        Self::with_rng(StdRng::from_entropy(), tube_count)
    }

    /// Create a reproducible sensor
    pub fn seeded(seed: u64, tube_count: usize) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), tube_count)
    }

    fn with_rng(rng: StdRng, tube_count: usize) -> Self {
        Self {
            rng,
            ph_range: DEFAULT_PH_RANGE,
            temperature_range: DEFAULT_TEMPERATURE_RANGE,
            enabled: vec![true; tube_count],
        }
    }

    /// Override the value ranges readings are drawn from
    ///
    /// Empty ranges fall back to the defaults.
    #[must_use]
    pub fn with_ranges(mut self, ph_range: Range<f64>, temperature_range: Range<f64>) -> Self {
        if !ph_range.is_empty() {
            self.ph_range = ph_range;
        }
        if !temperature_range.is_empty() {
            self.temperature_range = temperature_range;
        }
        self
    }

    fn slot(&self, tube: TubeId) -> Option<usize> {
        let index = usize::from(tube).checked_sub(1)?;
        (index < self.enabled.len()).then_some(index)
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self, tube: TubeId) -> Result<Reading> {
        let index = self.slot(tube).ok_or(TelemetryError::InvalidTube(tube))?;
        if !self.enabled[index] {
            return Err(TelemetryError::Sensor {
                tube,
                reason: "actuators are switched off".to_string(),
            });
        }

        let ph = self.rng.gen_range(self.ph_range.clone());
        let temperature = self.rng.gen_range(self.temperature_range.clone());
        Ok(Reading::new(ph, temperature))
    }

    fn set_enabled(&mut self, tube: TubeId, enabled: bool) {
        if let Some(index) = self.slot(tube) {
            self.enabled[index] = enabled;
        }
    }
}
