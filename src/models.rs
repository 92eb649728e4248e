//! Core data structures shared across the preprocessing pipeline.
//!
//! Defines the telemetry category tag, checkpoint entries, per-file
//! outcomes, and the run summary reported at completion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Telemetry category selecting the validation and coercion rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Battery,
    Gps,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Battery, Category::Gps];

    /// Detect category from the file path
    ///
    /// A directory component named `bms`/`battery` or `gps` decides first;
    /// failing that, the file stem is searched for the same markers.
    pub fn from_path(path: &Path) -> Option<Self> {
        for component in path.components().rev().skip(1) {
            let name = component.as_os_str().to_string_lossy().to_lowercase();
            match name.as_str() {
                "bms" | "battery" => return Some(Category::Battery),
                "gps" => return Some(Category::Gps),
                _ => {}
            }
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if stem.contains("bms") || stem.contains("battery") {
            Some(Category::Battery)
        } else if stem.contains("gps") {
            Some(Category::Gps)
        } else {
            None
        }
    }

    /// Short name used in checkpoint keys and consolidated file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Battery => "bms",
            Category::Gps => "gps",
        }
    }

    /// Checkpoint key for a file of this category: `<category>_<basename>`
    pub fn file_key(&self, path: &Path) -> String {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.key_for(&basename)
    }

    /// Checkpoint key for an arbitrary file label
    pub fn key_for(&self, name: &str) -> String {
        format!("{}_{}", self.as_str(), name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress status of a checkpointed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
}

/// Persisted progress marker for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub processed_rows: u64,
    pub total_rows: u64,
    pub status: CheckpointStatus,
    /// Output length in bytes after the last committed chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<u64>,
}

impl CheckpointEntry {
    pub fn in_progress(processed_rows: u64, total_rows: u64, output_bytes: u64) -> Self {
        let status = if processed_rows >= total_rows {
            CheckpointStatus::Completed
        } else {
            CheckpointStatus::InProgress
        };
        Self {
            processed_rows,
            total_rows,
            status,
            output_bytes: Some(output_bytes),
        }
    }

    pub fn completed(total_rows: u64, output_bytes: Option<u64>) -> Self {
        Self {
            processed_rows: total_rows,
            total_rows,
            status: CheckpointStatus::Completed,
            output_bytes,
        }
    }

    /// Whether the file needs no further work given its current row count
    pub fn is_complete_for(&self, total_rows: u64) -> bool {
        self.status == CheckpointStatus::Completed && self.processed_rows >= total_rows
    }
}

/// How a single file task ended
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Rows were processed and written
    Success { rows_written: usize },
    /// Checkpoint shows the file is already complete
    AlreadyComplete,
    /// The file held no data rows
    Empty,
    /// No category could be derived from the path
    Uncategorized,
    /// File-level failure; sibling files are unaffected
    Failed { reason: String },
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// Outcome of one input file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub category: Option<Category>,
    pub outcome: FileOutcome,
}

/// Run-level statistics
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<FileReport>,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, FileOutcome::Success { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    FileOutcome::AlreadyComplete | FileOutcome::Empty | FileOutcome::Uncategorized
                )
            })
            .count()
    }

    pub fn rows_written(&self) -> usize {
        self.reports
            .iter()
            .map(|r| match r.outcome {
                FileOutcome::Success { rows_written } => rows_written,
                _ => 0,
            })
            .sum()
    }
}
