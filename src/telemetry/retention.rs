//! # Retention Policy
//!
//! Bounds disk usage by deleting whole day directories once there are more of
//! them than the configured lifespan budget.
//!
//! ## Ordering
//!
//! Day directories are ordered by creation time (modification time on
//! filesystems without a birth time). Ties are broken by the calendar day in
//! the `DD-MM-YYYY` name and then by the name itself, so the same directory set
//! always yields the same victim. Entries whose name is not a day are never
//! considered.
//!
//! ## Budget
//!
//! The budget counts every day directory including the one being written
//! today. A budget of 3 with 5 directories present evicts one directory per
//! call until 3 remain.

use chrono::NaiveDate;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::error::Result;

use super::recorder::DAY_DIR_FORMAT;

/// One day directory found under the data root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDirectory {
    pub path: PathBuf,
    pub day: NaiveDate,
    pub created: SystemTime,
}

/// Evicts old day directories under a data root
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    data_root: PathBuf,
}

impl RetentionPolicy {
    pub fn new<P: AsRef<Path>>(data_root: P) -> Self {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
        }
    }

    /// Day directories under the data root, oldest first
    ///
    /// A missing data root yields an empty list.
    pub fn day_directories(&self) -> Result<Vec<DayDirectory>> {
        let entries = match fs::read_dir(&self.data_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut days = Vec::new();
        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let Some(day) = name
                .to_str()
                .and_then(|n| NaiveDate::parse_from_str(n, DAY_DIR_FORMAT).ok())
            else {
                continue;
            };

            let created = metadata.created().or_else(|_| metadata.modified())?;
            days.push(DayDirectory {
                path: entry.path(),
                day,
                created,
            });
        }

        days.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then(a.day.cmp(&b.day))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(days)
    }

    /// Delete the oldest day directory if there are more than `lifespan_budget`
    ///
    /// Called once per day rollover. Deletes at most one directory, never
    /// `active_dir`.
    ///
    /// # Returns
    ///
    /// The evicted directory, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the data root cannot be listed or the victim cannot be
    /// removed.
    pub fn maybe_evict(&self, lifespan_budget: usize, active_dir: &Path) -> Result<Option<PathBuf>> {
        let days = self.day_directories()?;
        debug!(
            "Retention check: {} day directories, budget {}",
            days.len(),
            lifespan_budget
        );

        if days.len() <= lifespan_budget {
            return Ok(None);
        }

        let Some(victim) = days.into_iter().find(|d| d.path != active_dir) else {
            return Ok(None);
        };

        fs::remove_dir_all(&victim.path)?;
        info!("Evicted day directory {}", victim.path.display());
        Ok(Some(victim.path))
    }
}
