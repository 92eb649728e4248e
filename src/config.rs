//! Configuration management and validation.
//!
//! Provides the processing parameters for a preprocessing run: chunk sizing,
//! execution and output modes, checkpoint location, and system profiling
//! used to pick between whole-file and streaming processing.

use crate::error::{PreprocessError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default rows per chunk
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default number of non-null values sampled per column for GPS expansion
pub const DEFAULT_EXPANSION_SAMPLE_SIZE: usize = 50;

/// Default size above which Auto mode streams a file (100MB)
pub const DEFAULT_STREAMING_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

/// Checkpoint file name placed in the output directory by default
pub const DEFAULT_CHECKPOINT_FILE: &str = "processing_checkpoint.json";

/// How files are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One file at a time
    Sequential,
    /// Bounded worker pool, one task per file
    Parallel,
}

/// Shape of the output tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// One cleaned CSV per input file at the same relative path
    Mirrored,
    /// One CSV per category holding every file's rows
    Consolidated,
}

/// How a single file is pushed through the stage pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Pick per file by size
    Auto,
    /// Assemble all chunks, then normalize, dedup and write once
    WholeFile,
    /// Write and checkpoint every chunk as it is processed
    Streaming,
}

/// Global configuration for a preprocessing run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Rows per chunk
    pub batch_size: usize,

    /// Non-null values sampled per column when resolving GPS expansion
    pub expansion_sample_size: usize,

    /// Sequential or parallel file scheduling
    pub execution: ExecutionMode,

    /// Worker pool size for parallel execution
    pub workers: usize,

    /// Mirrored tree or per-category consolidated output
    pub layout: OutputLayout,

    /// Whole-file, streaming, or size-based selection
    pub mode: ProcessingMode,

    /// Files above this size stream when mode is Auto
    pub streaming_threshold_bytes: u64,

    /// Checkpoint file location (defaults into the output directory)
    pub checkpoint_path: Option<PathBuf>,

    /// Glob matched against file names during discovery
    pub file_pattern: String,

    /// Show a progress bar while processing
    pub show_progress: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            expansion_sample_size: DEFAULT_EXPANSION_SAMPLE_SIZE,
            execution: ExecutionMode::Parallel,
            workers: num_cpus::get(),
            layout: OutputLayout::Mirrored,
            mode: ProcessingMode::Auto,
            streaming_threshold_bytes: DEFAULT_STREAMING_THRESHOLD_BYTES,
            checkpoint_path: None,
            file_pattern: "*.csv".to_string(),
            show_progress: true,
        }
    }
}

impl PreprocessConfig {
    /// Load configuration from a JSON file, falling back to defaults for
    /// any field the file leaves out
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PreprocessError::Configuration {
            message: format!("cannot read config file {}: {}", path.display(), e),
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| PreprocessError::Configuration {
                message: format!("invalid config file {}: {}", path.display(), e),
            })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PreprocessError::Configuration {
                message: "batch_size must be greater than zero".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(PreprocessError::Configuration {
                message: "workers must be greater than zero".to_string(),
            });
        }
        if self.expansion_sample_size == 0 {
            return Err(PreprocessError::Configuration {
                message: "expansion_sample_size must be greater than zero".to_string(),
            });
        }
        glob::Pattern::new(&self.file_pattern).map_err(|e| PreprocessError::Configuration {
            message: format!("invalid file pattern '{}': {}", self.file_pattern, e),
        })?;
        Ok(())
    }

    /// Resolve the checkpoint file for a given output directory
    pub fn checkpoint_file(&self, output_dir: &Path) -> PathBuf {
        self.checkpoint_path
            .clone()
            .unwrap_or_else(|| output_dir.join(DEFAULT_CHECKPOINT_FILE))
    }

    /// Effective number of concurrent file tasks
    pub fn effective_workers(&self) -> usize {
        match self.execution {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self.workers.max(1),
        }
    }

    /// Set custom batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set expansion sample size
    pub fn with_expansion_sample_size(mut self, sample_size: usize) -> Self {
        self.expansion_sample_size = sample_size;
        self
    }

    /// Run files one at a time
    pub fn sequential(mut self) -> Self {
        self.execution = ExecutionMode::Sequential;
        self
    }

    /// Run files on a worker pool of the given size
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.execution = ExecutionMode::Parallel;
        self.workers = workers;
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_streaming_threshold(mut self, bytes: u64) -> Self {
        self.streaming_threshold_bytes = bytes;
        self
    }

    pub fn with_checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Disable the progress bar
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }
}

/// System profiling information used to bound whole-file processing
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Number of CPU cores available
    pub cpu_cores: usize,
    /// Total memory in MB
    pub memory_mb: usize,
}

impl SystemProfile {
    /// Auto-detect system capabilities
    pub fn detect() -> Self {
        use sysinfo::System;

        let mut system = System::new();
        system.refresh_memory();

        Self {
            cpu_cores: num_cpus::get(),
            memory_mb: (system.total_memory() / 1024 / 1024) as usize,
        }
    }

    /// Streaming threshold for Auto mode
    ///
    /// A whole file is held in memory several times over while it is parsed
    /// and transformed, so `workers` concurrent whole files must fit in a
    /// quarter of total memory at roughly 4x their on-disk size.
    pub fn streaming_threshold(&self, configured: u64, workers: usize) -> u64 {
        if self.memory_mb == 0 {
            return configured;
        }
        let budget = (self.memory_mb as u64 * 1024 * 1024) / 4;
        let per_file = budget / (workers.max(1) as u64 * 4);
        let threshold = configured.min(per_file.max(1024 * 1024));

        debug!(
            "Streaming threshold: {} bytes ({} workers, {}MB memory, {} cores)",
            threshold, workers, self.memory_mb, self.cpu_cores
        );
        threshold
    }
}
