//! # Bioreactor Telemetry Library
//!
//! Live data pipeline for a multi-tube bioreactor rig.
//!
//! This library samples pH and temperature from every enabled tube on a fixed
//! cadence, records each sample to CSV, keeps rolling chart buffers, and mails
//! stakeholders when a tube leaves its configured thresholds.

pub mod alert;
pub mod config;
pub mod error;
pub mod sensor;
pub mod settings;
pub mod telemetry;
