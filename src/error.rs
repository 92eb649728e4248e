//! Error handling for telemetry preprocessing.
//!
//! Row-level problems never reach these types: out-of-range and unparsable
//! values are nulled in place. What remains are file-level failures (caught
//! per file by the orchestrator), checkpoint failures, and configuration
//! failures that abort the run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input directory not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing failed for file: {path} - {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Column set changed mid-file in {path}: expected [{expected}], found [{found}]")]
    SchemaDrift {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Checkpoint for {key} would move backwards: {current} -> {attempted} rows")]
    CheckpointRegression {
        key: String,
        current: u64,
        attempted: u64,
    },
}

impl PreprocessError {
    /// Whether this error must abort the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PreprocessError::InputNotFound { .. } | PreprocessError::Configuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PreprocessError>;
