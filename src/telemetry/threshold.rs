//! # Threshold Evaluator
//!
//! Stateless "is this tube unhealthy" classification.
//!
//! A reading is healthy when its pH lies inside the inclusive band
//! `[ph_low, ph_high]` and its temperature is at or below the ceiling. With the
//! defaults that means pH 7.0 and 8.0 and exactly 30 °C are all healthy.
//! Non-finite readings are always unhealthy.
//!
//! ```
//! use bioreactor_telemetry::telemetry::threshold::ThresholdEvaluator;
//!
//! let evaluator = ThresholdEvaluator::new(7.0, 8.0, 30.0, 6);
//! assert!(!evaluator.classify(7.0, 30.0));
//! assert!(evaluator.classify(6.9, 25.0));
//! assert!(evaluator.classify(7.5, 30.1));
//! ```

use crate::config::ThresholdConfig;

use super::sample::TubeId;

/// Classifies readings against a pH band and temperature ceilings
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdEvaluator {
    ph_low: f64,
    ph_high: f64,
    temperature_max: f64,
    /// Effective ceiling per tube, index 0 is tube 1
    tube_ceilings: Vec<f64>,
}

impl ThresholdEvaluator {
    /// Create an evaluator where every tube shares `temperature_max`
    #[must_use]
    pub fn new(ph_low: f64, ph_high: f64, temperature_max: f64, tube_count: usize) -> Self {
        Self {
            ph_low,
            ph_high,
            temperature_max,
            tube_ceilings: vec![temperature_max; tube_count],
        }
    }

    /// Build from the `[thresholds]` config section, applying per-tube overrides
    #[must_use]
    pub fn from_config(config: &ThresholdConfig, tube_count: usize) -> Self {
        config.overrides.iter().fold(
            Self::new(config.ph_low, config.ph_high, config.temperature_max, tube_count),
            |evaluator, o| evaluator.with_tube_ceiling(o.tube, o.temperature_max),
        )
    }

    /// Give one tube its own temperature ceiling
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    #[must_use]
    pub fn with_tube_ceiling(mut self, tube: TubeId, temperature_max: f64) -> Self {
        let index = self.index(tube);
        self.tube_ceilings[index] = temperature_max;
        self
    }

    pub fn tube_count(&self) -> usize {
        self.tube_ceilings.len()
    }

    /// Temperature ceiling in effect for `tube`
    pub fn ceiling(&self, tube: TubeId) -> f64 {
        self.tube_ceilings[self.index(tube)]
    }

    /// Classify a reading against the default ceiling
    ///
    /// Returns `true` if the reading is unhealthy.
    #[must_use]
    pub fn classify(&self, ph: f64, temperature: f64) -> bool {
        self.violates(ph, temperature, self.temperature_max)
    }

    /// Classify a reading against the ceiling configured for `tube`
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    #[must_use]
    pub fn classify_tube(&self, tube: TubeId, ph: f64, temperature: f64) -> bool {
        self.violates(ph, temperature, self.ceiling(tube))
    }

    /// Classify one reading per tube, element `i` belonging to tube `i + 1`
    ///
    /// # Panics
    ///
    /// Panics if either slice's length differs from the tube count.
    #[must_use]
    pub fn classify_many(&self, phs: &[f64], temperatures: &[f64]) -> Vec<bool> {
        assert_eq!(phs.len(), self.tube_count(), "one pH value per tube required");
        assert_eq!(
            temperatures.len(),
            self.tube_count(),
            "one temperature per tube required"
        );

        phs.iter()
            .zip(temperatures)
            .zip(&self.tube_ceilings)
            .map(|((&ph, &temperature), &ceiling)| self.violates(ph, temperature, ceiling))
            .collect()
    }

    #[inline]
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    fn violates(&self, ph: f64, temperature: f64, ceiling: f64) -> bool {
        // Negated comparisons so NaN lands on the unhealthy side
        !(self.ph_low..=self.ph_high).contains(&ph) || !(temperature <= ceiling)
    }

    fn index(&self, tube: TubeId) -> usize {
        let count = self.tube_ceilings.len();
        assert!(
            tube >= 1 && usize::from(tube) <= count,
            "tube {} out of range 1..={}",
            tube,
            count
        );
        usize::from(tube) - 1
    }
}
