//! # Stakeholder List
//!
//! People who receive alert mail, persisted as a `name,email` CSV file.
//!
//! Clones share the same list, so the alert dispatcher always reads the
//! current recipients: additions and removals made from the settings pages take
//! effect on the next alert without a restart.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::error::Result;

/// One alert recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Shared, optionally file-backed list of recipients
#[derive(Debug, Clone, Default)]
pub struct StakeholderList {
    path: Option<PathBuf>,
    entries: Arc<RwLock<Vec<Recipient>>>,
}

impl StakeholderList {
    /// A list that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the list from a CSV file with a `name,email` header
    ///
    /// A missing file is an empty list; the file is created on the first
    /// change.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::File::open(&path) {
            Ok(file) => {
                let mut reader = csv::ReaderBuilder::new()
                    .trim(csv::Trim::All)
                    .from_reader(file);
                reader
                    .deserialize()
                    .collect::<std::result::Result<Vec<Recipient>, _>>()?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} stakeholders from {}", entries.len(), path.display());

        Ok(Self {
            path: Some(path),
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Add a recipient, replacing any existing entry with the same name
    pub fn add(&self, name: &str, email: &str) -> Result<()> {
        self.mutate(|entries| {
            let recipient = Recipient::new(name.trim(), email.trim());
            match entries.iter_mut().find(|r| r.name == recipient.name) {
                Some(existing) => *existing = recipient,
                None => entries.push(recipient),
            }
        })
    }

    /// Remove the recipient called `name`
    ///
    /// # Returns
    ///
    /// `true` if someone was removed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut removed = false;
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|r| r.name != name);
            removed = entries.len() != before;
        })?;
        Ok(removed)
    }

    /// Remove everybody
    pub fn clear(&self) -> Result<()> {
        self.mutate(Vec::clear)
    }

    /// Snapshot of the current recipients, in insertion order
    pub fn recipients(&self) -> Vec<Recipient> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate<F: FnOnce(&mut Vec<Recipient>)>(&self, change: F) -> Result<()> {
        let snapshot = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            change(&mut entries);
            entries.clone()
        };
        self.persist(&snapshot)
    }

    /// Rewrite the CSV file through a temporary file and a rename
    fn persist(&self, entries: &[Recipient]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(["name", "email"])?;
        for recipient in entries {
            writer.write_record([&recipient.name, &recipient.email])?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("csv.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        debug!("Saved {} stakeholders to {}", entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let list = StakeholderList::load(dir.path().join("stakeholders.csv")).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_load_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stakeholders.csv");
        fs::write(&path, "name,email\nAda, ada@example.com\nGrace,grace@example.com\n").unwrap();

        let list = StakeholderList::load(&path).unwrap();
        assert_eq!(
            list.recipients(),
            vec![
                Recipient::new("Ada", "ada@example.com"),
                Recipient::new("Grace", "grace@example.com"),
            ]
        );
    }

    #[test]
    fn test_changes_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stakeholders.csv");

        let list = StakeholderList::load(&path).unwrap();
        list.add("Ada", "ada@example.com").unwrap();
        list.add("Grace", "grace@example.com").unwrap();
        assert!(list.remove("Ada").unwrap());
        assert!(!list.remove("Nobody").unwrap());

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "name,email\nGrace,grace@example.com\n"
        );

        let reloaded = StakeholderList::load(&path).unwrap();
        assert_eq!(reloaded.recipients(), vec![Recipient::new("Grace", "grace@example.com")]);
    }

    #[test]
    fn test_add_same_name_replaces() {
        let list = StakeholderList::in_memory();
        list.add("Ada", "old@example.com").unwrap();
        list.add("Ada", "new@example.com").unwrap();

        assert_eq!(list.recipients(), vec![Recipient::new("Ada", "new@example.com")]);
    }

    #[test]
    fn test_clones_share_live_view() {
        let list = StakeholderList::in_memory();
        let view = list.clone();

        list.add("Ada", "ada@example.com").unwrap();
        assert_eq!(view.len(), 1);

        list.clear().unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_names_with_commas_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stakeholders.csv");

        let list = StakeholderList::load(&path).unwrap();
        list.add("Lovelace, Ada", "ada@example.com").unwrap();

        let reloaded = StakeholderList::load(&path).unwrap();
        assert_eq!(reloaded.recipients()[0].name, "Lovelace, Ada");
    }
}
