//! # Telemetry Module
//!
//! The live sampling pipeline.
//!
//! This module handles:
//! - Periodic sampling of every enabled tube
//! - Appending samples to per-day, per-tube CSV files
//! - Evicting old day directories
//! - Rolling chart buffers
//! - Threshold classification and alert hand-off

pub mod buffer;
pub mod recorder;
pub mod retention;
pub mod sample;
pub mod scheduler;
pub mod threshold;

pub use buffer::TubeSeriesBuffer;
pub use recorder::SampleRecorder;
pub use retention::RetentionPolicy;
pub use sample::{Reading, Sample, TubeId};
pub use scheduler::{
    BufferSnapshot, SchedulerCommand, SchedulerHandle, TelemetryScheduler, TickReport, TubeSeries,
    TubeState,
};
pub use threshold::ThresholdEvaluator;
