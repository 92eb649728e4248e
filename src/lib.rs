//! Fleet Telemetry Preprocessor Library
//!
//! Cleans, validates and types raw vehicle telemetry exports (battery
//! management system and GPS CSV files) ahead of analysis.
//!
//! This library provides tools for:
//! - Chunked CSV reading that can resume at any committed row offset
//! - Header-echo and blank-row cleanup, GPS list-column expansion
//! - Schema-driven range validation and type coercion
//! - Two-digit-year timestamp repair and exact duplicate removal
//! - Mirrored or per-category consolidated CSV output
//! - Row-level JSON checkpoints shared by sequential and parallel runs

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod schema;

pub use checkpoint::{CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore};
pub use config::{ExecutionMode, OutputLayout, PreprocessConfig, ProcessingMode};
pub use error::{PreprocessError, Result};
pub use models::{Category, CheckpointEntry, CheckpointStatus, FileOutcome, FileReport, RunSummary};
pub use pipeline::FilePipeline;
pub use processor::Preprocessor;
