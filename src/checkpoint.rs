//! Row-level checkpointing for resumable processing.
//!
//! The store maps `<category>_<basename>` keys to a [`CheckpointEntry`].
//! Each file task owns exactly one key, so concurrent workers never contend
//! for the same entry; the lock below only serializes persistence of the
//! whole mapping.

use crate::error::{PreprocessError, Result};
use crate::models::CheckpointEntry;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Persisted per-file progress
pub trait CheckpointStore: Send + Sync {
    /// Current entry for a file, if any
    fn get(&self, key: &str) -> Option<CheckpointEntry>;

    /// Record progress for a file
    ///
    /// `processed_rows` must never decrease for a key; a regression is
    /// rejected so that a resumed run cannot skip rows.
    fn put(&self, key: &str, entry: CheckpointEntry) -> Result<()>;

    /// Snapshot of every entry, ordered by key
    fn entries(&self) -> BTreeMap<String, CheckpointEntry>;
}

fn check_regression(
    existing: Option<&CheckpointEntry>,
    key: &str,
    entry: &CheckpointEntry,
) -> Result<()> {
    match existing {
        Some(current) if entry.processed_rows < current.processed_rows => {
            Err(PreprocessError::CheckpointRegression {
                key: key.to_string(),
                current: current.processed_rows,
                attempted: entry.processed_rows,
            })
        }
        _ => Ok(()),
    }
}

/// JSON-file backed checkpoint store
///
/// The file is rewritten atomically (temp file + rename) after every put, so
/// an interrupted write leaves the previous mapping intact.
#[derive(Debug)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CheckpointEntry>>,
}

impl JsonCheckpointStore {
    /// Open a store, treating a missing, unreadable, or corrupt file as empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        debug!(
            "Opened checkpoint store {} with {} entries",
            path.display(),
            entries.len()
        );
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn load(path: &Path) -> BTreeMap<String, CheckpointEntry> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(
                    "Checkpoint {} unreadable, starting without checkpoint: {}",
                    path.display(),
                    e
                );
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Checkpoint {} is corrupt, starting without checkpoint: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, CheckpointEntry>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PreprocessError::Io(e.error))?;
        Ok(())
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn get(&self, key: &str) -> Option<CheckpointEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn put(&self, key: &str, entry: CheckpointEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        check_regression(entries.get(key), key, &entry)?;
        entries.insert(key.to_string(), entry);
        // Held across the write so file contents follow put order
        self.persist(&entries)
    }

    fn entries(&self) -> BTreeMap<String, CheckpointEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Process-local checkpoint store with no persistence
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, CheckpointEntry>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, key: &str) -> Option<CheckpointEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, entry: CheckpointEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        check_regression(entries.get(key), key, &entry)?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn entries(&self) -> BTreeMap<String, CheckpointEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
