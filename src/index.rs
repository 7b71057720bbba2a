//! Persisted Change-Set Index.
//!
//! Maps every synced path to the fingerprint it was synced with, when, and
//! how many chunk records it occupies remotely. This file is the only durable
//! state of the sync engine.
//!
//! Tracking the chunk count here means a delete never needs to ask the
//! remote store which records belong to a path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::RunError;
use crate::hash::Fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fingerprint: Fingerprint,
    pub synced_at: DateTime<Utc>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetIndex {
    #[serde(default)]
    entries: BTreeMap<String, IndexEntry>,
}

impl ChangeSetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from disk.
    ///
    /// A missing file is a first run. An unreadable or invalid file is
    /// logged and replaced by an empty index, which makes the next run a
    /// full resync rather than a failure.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no index found, starting empty");
                return Self::new();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "index unreadable, resyncing everything");
                return Self::new();
            }
        };

        if content.trim().is_empty() {
            tracing::warn!(path = %path.display(), "index is empty, resyncing everything");
            return Self::new();
        }

        match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "index corrupt, resyncing everything");
                Self::new()
            }
        }
    }

    /// Write the index atomically: temp file in the same directory, fsync,
    /// rename over the previous file.
    pub fn save(&self, path: &Path) -> Result<(), RunError> {
        let persist_err = |source| RunError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let tmp_path = temp_path(path);
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(persist_err(e));
        }
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, entry: IndexEntry) {
        self.entries.insert(path, entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_chunks(&self) -> usize {
        self.entries.values().map(|e| e.chunk_count).sum()
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.entries.values().map(|e| e.synced_at).max()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
