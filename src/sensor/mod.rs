//! # Sensor Module
//!
//! Abstraction over the per-tube pH/temperature probes and the actuator
//! switches that gate them.
//!
//! The telemetry scheduler only talks to [`SensorSource`]; swapping the
//! simulated rig for real hardware means providing another implementation.

pub mod simulated;

pub use simulated::SimulatedSensor;

use crate::error::Result;
use crate::telemetry::sample::{Reading, TubeId};

/// Source of raw readings, one tube at a time
///
/// Reads happen inside the synchronous part of a tick, so implementations
/// must not block for long.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send {
    /// Take one reading from `tube`
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TelemetryError::Sensor`] if the tube's probes
    /// cannot be read. The scheduler skips that tube for the tick.
    fn read(&mut self, tube: TubeId) -> Result<Reading>;

    /// Mirror a tube's actuator status
    fn set_enabled(&mut self, _tube: TubeId, _enabled: bool) {}
}
