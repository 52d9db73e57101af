//! # Sample Recorder
//!
//! Append-only CSV persistence, one directory per calendar day and one file per
//! tube:
//!
//! ```text
//! data/
//! ├── 15-10-2026/
//! │   ├── tube1.csv
//! │   └── tube2.csv
//! └── 16-10-2026/
//!     └── tube1.csv
//! ```
//!
//! Every file starts with a single `Time,pH,Temperature` header followed by
//! `HH:MM:SS,<ph>,<temperature>` rows. Directories and headers are created on
//! demand by checking the filesystem on every append, so a directory deleted
//! by hand is simply recreated on the next tick.

use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};

use super::sample::{Sample, TubeId};

/// Header row written once at the top of every tube file
pub const CSV_HEADER: [&str; 3] = ["Time", "pH", "Temperature"];

/// `strftime` format of day directory names
pub const DAY_DIR_FORMAT: &str = "%d-%m-%Y";

/// `strftime` format of the time column
pub const ROW_TIME_FORMAT: &str = "%H:%M:%S";

/// Writes samples under a data root
#[derive(Debug, Clone)]
pub struct SampleRecorder {
    data_root: PathBuf,
}

impl SampleRecorder {
    pub fn new<P: AsRef<Path>>(data_root: P) -> Self {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Directory holding all tube files for `date`
    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.data_root.join(date.format(DAY_DIR_FORMAT).to_string())
    }

    /// CSV file for one tube on `date`
    pub fn tube_file(&self, date: NaiveDate, tube: TubeId) -> PathBuf {
        self.day_dir(date).join(format!("tube{}.csv", tube))
    }

    /// Append one sample to its tube's file for the sample's date
    ///
    /// Creates the day directory and the file (with header) if either is
    /// missing. The row is written with a single `write_all`; if that fails the
    /// file is truncated back to its previous length so no partial row remains.
    ///
    /// # Returns
    ///
    /// Path of the file written to.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Record`] if the directory or file cannot be
    /// created or written.
    pub fn append(&self, tube: TubeId, sample: &Sample) -> Result<PathBuf> {
        let dir = self.day_dir(sample.timestamp.date());
        fs::create_dir_all(&dir).map_err(|source| TelemetryError::Record {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("tube{}.csv", tube));
        let record_err = |source| TelemetryError::Record {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(record_err)?;
        let previous_len = file.metadata().map_err(record_err)?.len();

        let row = encode_row(sample, previous_len == 0)?;
        write_or_roll_back(&mut &file, &file, previous_len, &row, &path).map_err(record_err)?;

        debug!("Recorded tube {} sample to {}", tube, path.display());
        Ok(path)
    }
}

/// Write `row` through `writer`, truncating `file` back to `previous_len` on failure
fn write_or_roll_back<W: Write>(
    writer: &mut W,
    file: &File,
    previous_len: u64,
    row: &[u8],
    path: &Path,
) -> io::Result<()> {
    let result = writer.write_all(row).and_then(|()| writer.flush());
    if result.is_err() {
        if let Err(e) = file.set_len(previous_len) {
            warn!("Could not roll back partial row in {}: {}", path.display(), e);
        }
    }
    result
}

/// Encode one row, preceded by the header when starting a new file
fn encode_row(sample: &Sample, with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(64));

    if with_header {
        writer.write_record(CSV_HEADER)?;
    }
    writer.write_record([
        sample.timestamp.format(ROW_TIME_FORMAT).to_string(),
        format!("{:.2}", sample.ph),
        format!("{:.2}", sample.temperature),
    ])?;

    writer
        .into_inner()
        .map_err(|e| TelemetryError::Io(e.into_error()))
}
