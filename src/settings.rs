//! # Data Settings
//!
//! Operator-facing data settings persisted as JSON, and the two lookup tables
//! that turn their labels into a read interval and a data lifespan.
//!
//! Settings hold labels (`"5sec"`, `"4 weeks"`) rather than raw numbers so the
//! UI can present a fixed menu. The tables are loaded once at startup and shared
//! by reference; there is no process-wide mutable state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};

/// Persisted data settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Number of points kept on the live charts
    pub data_points: usize,
    /// Label looked up in the read interval table
    pub read_interval_key: String,
    /// Label looked up in the data lifespan table
    pub data_life_key: String,
}

impl DataSettings {
    fn validate(&self) -> Result<()> {
        if self.data_points == 0 {
            return Err(TelemetryError::InvalidSettings(
                "data_points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Data settings with their labels resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub data_points: usize,
    pub read_interval: Duration,
    /// Number of day directories to keep
    pub lifespan_days: usize,
    pub source: DataSettings,
}

/// JSON-backed settings store with change tracking
///
/// Mirrors the load / update / save cycle of the settings pages: edits are
/// held in memory until [`SettingsStore::save`] is called, and
/// [`SettingsStore::revert`] drops them again.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: DataSettings,
    saved: DataSettings,
    changed: bool,
}

impl SettingsStore {
    /// Load settings from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or holds
    /// invalid values. A missing settings file is a configuration error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = fs::read_to_string(&path)?;
        let settings: DataSettings = serde_json::from_str(&contents)?;
        settings.validate()?;
        debug!("Loaded data settings from {}: {:?}", path.display(), settings);

        Ok(Self {
            path,
            saved: settings.clone(),
            settings,
            changed: false,
        })
    }

    /// Current (possibly unsaved) settings
    pub fn get(&self) -> &DataSettings {
        &self.settings
    }

    /// Replace the current settings
    ///
    /// Marks the store as changed only if the new settings differ.
    pub fn update(&mut self, settings: DataSettings) -> Result<()> {
        settings.validate()?;
        if settings != self.settings {
            self.settings = settings;
            self.changed = true;
        }
        Ok(())
    }

    /// Whether there are edits that have not been saved
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Write the settings back to disk if they changed
    pub fn save(&mut self) -> Result<()> {
        if !self.changed {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, json)?;
        self.saved = self.settings.clone();
        self.changed = false;
        info!("Saved data settings: {:?}", self.settings);
        Ok(())
    }

    /// Discard unsaved edits
    pub fn revert(&mut self) {
        self.settings = self.saved.clone();
        self.changed = false;
    }
}

/// Label tables for read intervals (milliseconds) and data lifespans (days)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTables {
    read_intervals: BTreeMap<String, u64>,
    data_lifespans: BTreeMap<String, usize>,
}

impl LookupTables {
    /// Load both tables from JSON objects on disk
    ///
    /// # Errors
    ///
    /// Returns error if either file is missing or malformed, or if a table is
    /// empty or maps a label to zero.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(intervals_path: P, lifespans_path: Q) -> Result<Self> {
        let read_intervals = serde_json::from_str(&fs::read_to_string(intervals_path)?)?;
        let data_lifespans = serde_json::from_str(&fs::read_to_string(lifespans_path)?)?;
        Self::from_maps(read_intervals, data_lifespans)
    }

    /// Build tables from already parsed maps
    pub fn from_maps(
        read_intervals: BTreeMap<String, u64>,
        data_lifespans: BTreeMap<String, usize>,
    ) -> Result<Self> {
        if read_intervals.is_empty() || data_lifespans.is_empty() {
            return Err(TelemetryError::InvalidSettings(
                "lookup tables cannot be empty".to_string(),
            ));
        }
        if let Some((key, _)) = read_intervals.iter().find(|(_, ms)| **ms == 0) {
            return Err(TelemetryError::InvalidSettings(format!(
                "read interval {:?} must be greater than 0 ms",
                key
            )));
        }
        if let Some((key, _)) = data_lifespans.iter().find(|(_, days)| **days == 0) {
            return Err(TelemetryError::InvalidSettings(format!(
                "data lifespan {:?} must be at least 1 day",
                key
            )));
        }

        Ok(Self {
            read_intervals,
            data_lifespans,
        })
    }

    /// Tick interval for a read interval label
    pub fn read_interval(&self, key: &str) -> Result<Duration> {
        self.read_intervals
            .get(key)
            .map(|&ms| Duration::from_millis(ms))
            .ok_or_else(|| TelemetryError::UnknownKey {
                table: "read interval",
                key: key.to_string(),
            })
    }

    /// Number of day directories to keep for a data lifespan label
    pub fn data_lifespan(&self, key: &str) -> Result<usize> {
        self.data_lifespans
            .get(key)
            .copied()
            .ok_or_else(|| TelemetryError::UnknownKey {
                table: "data lifespan",
                key: key.to_string(),
            })
    }

    /// Resolve every label in `settings`
    pub fn resolve(&self, settings: &DataSettings) -> Result<ResolvedSettings> {
        settings.validate()?;
        Ok(ResolvedSettings {
            data_points: settings.data_points,
            read_interval: self.read_interval(&settings.read_interval_key)?,
            lifespan_days: self.data_lifespan(&settings.data_life_key)?,
            source: settings.clone(),
        })
    }

    /// Read interval labels, for settings menus
    pub fn interval_keys(&self) -> impl Iterator<Item = &str> {
        self.read_intervals.keys().map(String::as_str)
    }

    /// Data lifespan labels, for settings menus
    pub fn lifespan_keys(&self) -> impl Iterator<Item = &str> {
        self.data_lifespans.keys().map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) fn test_lookups() -> LookupTables {
    let intervals = [("1sec", 1000), ("5sec", 5000), ("1min", 60_000)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let lifespans = [("3 days", 3), ("1 week", 7), ("4 weeks", 28)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    LookupTables::from_maps(intervals, lifespans).unwrap()
}
