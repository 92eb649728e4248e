//! Main processing engine.
//!
//! Discovers input files, schedules one task per file (sequentially or on a
//! bounded worker pool), isolates per-file failures, and merges per-file
//! parts into per-category outputs when the consolidated layout is chosen.

pub mod discovery;
pub mod reader;
pub mod task;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::discovery::{DiscoveredFile, FileDiscovery, colliding_basenames};
use self::task::FileTask;
use self::writer::merge_parts;

use crate::checkpoint::{CheckpointStore, JsonCheckpointStore};
use crate::config::{ExecutionMode, OutputLayout, PreprocessConfig, SystemProfile};
use crate::error::{PreprocessError, Result};
use crate::models::{Category, FileOutcome, FileReport, RunSummary};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::System;
use tokio::fs;
use tokio::task as blocking;
use tracing::{debug, error, info, warn};

/// Directory under the output root holding per-file parts before merging
pub const PARTS_DIR: &str = ".parts";

/// Memory usage above which the worker pool is halved
const MEMORY_PRESSURE_THRESHOLD: f64 = 0.8;

/// Consolidated output file for a category
pub fn consolidated_path(output_path: &Path, category: Category) -> PathBuf {
    output_path.join(format!("{}.csv", category.as_str()))
}

/// Main processor for a telemetry input tree
pub struct Preprocessor {
    input_path: PathBuf,
    output_path: PathBuf,
    config: PreprocessConfig,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl Preprocessor {
    /// Create a processor; the input directory must exist
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Result<Self> {
        if !input_path.is_dir() {
            return Err(PreprocessError::InputNotFound { path: input_path });
        }

        Ok(Self {
            input_path,
            output_path,
            config: PreprocessConfig::default(),
            store: None,
        })
    }

    /// Configure the processor
    pub fn with_config(mut self, config: PreprocessConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific checkpoint store instead of the JSON file
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    fn checkpoint_store(&self) -> Arc<dyn CheckpointStore> {
        match &self.store {
            Some(store) => store.clone(),
            None => Arc::new(JsonCheckpointStore::open(
                self.config.checkpoint_file(&self.output_path),
            )),
        }
    }

    /// Output file for one input, by layout
    fn output_for(&self, file: &DiscoveredFile, category: Category) -> PathBuf {
        match self.config.layout {
            OutputLayout::Mirrored => self.output_path.join(&file.relative),
            OutputLayout::Consolidated => self
                .output_path
                .join(PARTS_DIR)
                .join(category.as_str())
                .join(&file.relative),
        }
    }

    /// Worker count for this run, reduced under memory pressure
    fn worker_count(&self, files: usize) -> usize {
        let configured = self.config.effective_workers().min(files.max(1));
        if configured > 1 && memory_pressure() {
            let reduced = (configured / 2).max(1);
            debug!(
                "Memory pressure detected, reducing workers from {} to {}",
                configured, reduced
            );
            return reduced;
        }
        configured
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Processing files");
        pb
    }

    /// Main processing entry point
    ///
    /// Per-file failures are reported in the summary; only configuration
    /// problems and a missing input directory return an error.
    pub async fn process(&self) -> Result<RunSummary> {
        let start_time = Instant::now();
        self.config.validate()?;

        if self.config.show_progress {
            println!("{}", "Starting telemetry preprocessing".bright_green().bold());
            println!("  {} {}", "Input:".bright_cyan(), self.input_path.display());
            println!("  {} {}", "Output:".bright_cyan(), self.output_path.display());
        }

        fs::create_dir_all(&self.output_path).await?;
        let store = self.checkpoint_store();

        // Step 1: Discover input files
        let discovery = FileDiscovery::new(self.input_path.clone(), &self.config.file_pattern)?
            .exclude(self.output_path.clone());
        let files = blocking::spawn_blocking(move || discovery.discover())
            .await
            .map_err(|e| PreprocessError::ProcessingFailed {
                path: self.input_path.clone(),
                reason: format!("discovery task failed: {}", e),
            })??;
        info!("Discovered {} files under {}", files.len(), self.input_path.display());

        // Step 2: Build one task per categorized file
        let workers = self.worker_count(files.len());
        let threshold = SystemProfile::detect()
            .streaming_threshold(self.config.streaming_threshold_bytes, workers);
        let collisions = colliding_basenames(&files);

        let mut reports = Vec::new();
        let mut tasks = Vec::new();
        for file in &files {
            let Some(category) = file.category else {
                warn!("Cannot determine category for {}, skipping", file.path.display());
                reports.push(FileReport {
                    path: file.path.clone(),
                    category: None,
                    outcome: FileOutcome::Uncategorized,
                });
                continue;
            };

            let basename = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let collides = collisions.contains_key(&(category, basename));
            let key = file
                .checkpoint_key(collides)
                .unwrap_or_else(|| category.file_key(&file.path));

            tasks.push(FileTask {
                input: file.path.clone(),
                output: self.output_for(file, category),
                category,
                key,
                mode: self.config.mode,
                streaming_threshold: threshold,
                batch_size: self.config.batch_size,
                sample_size: self.config.expansion_sample_size,
                store: store.clone(),
            });
        }

        let parts: Vec<(PathBuf, Category, PathBuf)> = tasks
            .iter()
            .map(|t| (t.input.clone(), t.category, t.output.clone()))
            .collect();

        // Step 3: Run the tasks
        let pb = self.progress_bar(tasks.len());
        let task_reports = match self.config.execution {
            ExecutionMode::Sequential => run_sequential(tasks, &pb).await,
            ExecutionMode::Parallel => run_parallel(tasks, workers, &pb).await,
        };
        pb.finish_and_clear();
        reports.extend(task_reports);

        // Step 4: Merge parts per category
        if self.config.layout == OutputLayout::Consolidated {
            let merge_reports = self.merge_consolidated(&parts, &reports).await;
            reports.extend(merge_reports);
        }

        reports.sort_by(|a, b| a.path.cmp(&b.path));
        let summary = RunSummary {
            reports,
            output_path: self.output_path.clone(),
            elapsed: start_time.elapsed(),
        };

        info!(
            "Run finished: {} succeeded, {} skipped, {} failed, {} rows written",
            summary.succeeded(),
            summary.skipped(),
            summary.failed(),
            summary.rows_written()
        );
        if self.config.show_progress {
            print_summary(&summary);
        }
        Ok(summary)
    }

    /// Merge the parts of every file that is now complete
    async fn merge_consolidated(
        &self,
        parts: &[(PathBuf, Category, PathBuf)],
        reports: &[FileReport],
    ) -> Vec<FileReport> {
        let mut merge_reports = Vec::new();

        for category in Category::ALL {
            let category_parts: Vec<PathBuf> = parts
                .iter()
                .filter(|(_, c, _)| *c == category)
                .filter(|(input, _, _)| {
                    reports.iter().any(|r| {
                        r.path == *input
                            && matches!(
                                r.outcome,
                                FileOutcome::Success { .. } | FileOutcome::AlreadyComplete
                            )
                    })
                })
                .map(|(_, _, part)| part.clone())
                .filter(|part| part.exists())
                .collect();

            if category_parts.is_empty() {
                continue;
            }

            let output = consolidated_path(&self.output_path, category);
            let batch_size = self.config.batch_size;
            let target = output.clone();
            let merged =
                blocking::spawn_blocking(move || merge_parts(&category_parts, &target, batch_size)).await;

            match merged {
                Ok(Ok(rows)) => info!(
                    "Wrote {} rows to consolidated {} output {}",
                    rows,
                    category,
                    output.display()
                ),
                Ok(Err(e)) => {
                    error!("Failed to merge {} output: {}", category, e);
                    merge_reports.push(FileReport {
                        path: output,
                        category: Some(category),
                        outcome: FileOutcome::Failed {
                            reason: e.to_string(),
                        },
                    });
                }
                Err(e) => {
                    error!("Merge task for {} panicked: {}", category, e);
                    merge_reports.push(FileReport {
                        path: output,
                        category: Some(category),
                        outcome: FileOutcome::Failed {
                            reason: format!("merge task failed: {}", e),
                        },
                    });
                }
            }
        }

        merge_reports
    }
}

/// Whether system memory use is above the pressure threshold
fn memory_pressure() -> bool {
    let mut system = System::new();
    system.refresh_memory();

    let total = system.total_memory() as f64;
    if total == 0.0 {
        return false;
    }
    system.used_memory() as f64 / total > MEMORY_PRESSURE_THRESHOLD
}

/// Run one file task on the blocking pool, turning any error into a report
async fn run_task(file_task: FileTask) -> FileReport {
    let path = file_task.input.clone();
    let category = Some(file_task.category);

    let outcome = match blocking::spawn_blocking(move || file_task.run()).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("Failed to process {}: {}", path.display(), e);
            FileOutcome::Failed {
                reason: e.to_string(),
            }
        }
        Err(e) => {
            error!("Worker for {} panicked: {}", path.display(), e);
            FileOutcome::Failed {
                reason: format!("worker failed: {}", e),
            }
        }
    };

    FileReport {
        path,
        category,
        outcome,
    }
}

async fn run_sequential(tasks: Vec<FileTask>, pb: &ProgressBar) -> Vec<FileReport> {
    let mut reports = Vec::with_capacity(tasks.len());
    for file_task in tasks {
        reports.push(run_task(file_task).await);
        pb.inc(1);
    }
    reports
}

async fn run_parallel(tasks: Vec<FileTask>, workers: usize, pb: &ProgressBar) -> Vec<FileReport> {
    debug!("Processing {} files on {} workers", tasks.len(), workers);
    stream::iter(tasks)
        .map(run_task)
        .buffer_unordered(workers.max(1))
        .inspect(|_| pb.inc(1))
        .collect()
        .await
}

/// Print the end-of-run summary
pub fn print_summary(summary: &RunSummary) {
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        summary.elapsed.as_millis().to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        summary.succeeded().to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files skipped:".bright_cyan(),
        summary.skipped().to_string().bright_white()
    );
    if summary.failed() > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            summary.failed().to_string().bright_red().bold()
        );
        for report in summary.reports.iter().filter(|r| r.outcome.is_failure()) {
            if let FileOutcome::Failed { reason } = &report.outcome {
                println!("    {} {}", report.path.display().to_string().red(), reason);
            }
        }
    }
    println!(
        "  {} {}",
        "Rows written:".bright_cyan(),
        summary.rows_written().to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Output:".bright_cyan(),
        summary.output_path.display()
    );
}
