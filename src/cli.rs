//! Command-line interface components.

use crate::checkpoint::{CheckpointStore, JsonCheckpointStore};
use crate::config::{OutputLayout, PreprocessConfig, ProcessingMode};
use crate::models::CheckpointStatus;
use crate::processor::Preprocessor;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "fleet-preprocessor")]
#[command(about = "Clean, validate and type vehicle telemetry CSV files with resumable checkpoints")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Preprocess every BMS and GPS file under an input directory
    Process(ProcessArgs),
    /// Show per-file progress recorded in a checkpoint file
    Status(StatusArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LayoutArg {
    Mirrored,
    Consolidated,
}

impl From<LayoutArg> for OutputLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Mirrored => OutputLayout::Mirrored,
            LayoutArg::Consolidated => OutputLayout::Consolidated,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ModeArg {
    Auto,
    WholeFile,
    Streaming,
}

impl From<ModeArg> for ProcessingMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Auto => ProcessingMode::Auto,
            ModeArg::WholeFile => ProcessingMode::WholeFile,
            ModeArg::Streaming => ProcessingMode::Streaming,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Root directory holding bms/ and gps/ telemetry files
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for cleaned output
    #[arg(short, long)]
    pub output: PathBuf,

    /// Mirror the input tree or write one file per category
    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,

    /// Whole-file, streaming, or size-based processing
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Process one file at a time
    #[arg(long, conflicts_with = "workers")]
    pub sequential: bool,

    /// Number of files processed concurrently
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Rows per chunk
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Checkpoint file (default: <output>/processing_checkpoint.json)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Glob matched against file names
    #[arg(long)]
    pub pattern: Option<String>,

    /// Hide the progress bar and summary
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl ProcessArgs {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Build the run configuration: file (if any), then flag overrides
    pub fn to_config(&self) -> Result<PreprocessConfig> {
        let mut config = match &self.config {
            Some(path) => PreprocessConfig::from_file(path)?,
            None => PreprocessConfig::default(),
        };

        if let Some(layout) = self.layout {
            config = config.with_layout(layout.into());
        }
        if let Some(mode) = self.mode {
            config = config.with_mode(mode.into());
        }
        if self.sequential {
            config = config.sequential();
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(checkpoint) = &self.checkpoint {
            config = config.with_checkpoint_path(checkpoint.clone());
        }
        if let Some(pattern) = &self.pattern {
            config = config.with_file_pattern(pattern.clone());
        }
        if self.no_progress {
            config = config.without_progress();
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Checkpoint file to inspect
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Command {
    pub fn log_level(&self) -> &'static str {
        match self {
            Command::Process(args) => args.log_level(),
            Command::Status(args) if args.verbose => "debug",
            Command::Status(_) => "warn",
        }
    }
}

/// Set up structured logging on stderr
pub fn setup_logging(log_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fleet_preprocessor={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {}", log_level);
}

/// Execute a parsed command
pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Process(process_args) => {
            let config = process_args.to_config()?;
            let processor =
                Preprocessor::new(process_args.input.clone(), process_args.output.clone())?
                    .with_config(config);
            processor.process().await?;
            Ok(())
        }
        Command::Status(status_args) => show_status(&status_args.checkpoint),
    }
}

/// Print the entries of a checkpoint file without modifying it
pub fn show_status(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Checkpoint file not found: {}", path.display());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
    serde_json::from_str::<serde_json::Value>(&contents)
        .with_context(|| format!("Checkpoint {} is not valid JSON", path.display()))?;

    let store = JsonCheckpointStore::open(path);
    let entries = store.entries();

    println!("{} {}", "Checkpoint:".bright_cyan(), path.display());
    if entries.is_empty() {
        println!("  {}", "No files recorded".bright_yellow());
        return Ok(());
    }

    let width = entries.keys().map(|k| k.len()).max().unwrap_or(0);
    let mut completed = 0usize;
    for (key, entry) in &entries {
        let percent = if entry.total_rows == 0 {
            100.0
        } else {
            entry.processed_rows as f64 * 100.0 / entry.total_rows as f64
        };
        let status = match entry.status {
            CheckpointStatus::Completed => {
                completed += 1;
                "completed".bright_green()
            }
            CheckpointStatus::InProgress => "in progress".bright_yellow(),
        };
        println!(
            "  {:<width$}  {:>10}/{:<10} {:>6.1}%  {}",
            key,
            entry.processed_rows,
            entry.total_rows,
            percent,
            status,
            width = width
        );
    }

    println!(
        "\n  {} {} of {} files complete",
        "Status:".bright_cyan(),
        completed.to_string().bright_white().bold(),
        entries.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckpointEntry;
    use tempfile::TempDir;

    #[test]
    fn test_process_flags_override_defaults() {
        let args = Args::parse_from([
            "fleet-preprocessor",
            "process",
            "--input",
            "/data/raw",
            "--output",
            "/data/clean",
            "--layout",
            "consolidated",
            "--mode",
            "whole-file",
            "-j",
            "3",
            "--batch-size",
            "500",
            "--no-progress",
        ]);
        let Command::Process(process_args) = args.command else {
            panic!("expected process command");
        };
        let config = process_args.to_config().unwrap();

        assert_eq!(config.layout, OutputLayout::Consolidated);
        assert_eq!(config.mode, ProcessingMode::WholeFile);
        assert_eq!(config.effective_workers(), 3);
        assert_eq!(config.batch_size, 500);
        assert!(!config.show_progress);
        assert_eq!(process_args.log_level(), "info");
    }

    #[test]
    fn test_sequential_conflicts_with_workers() {
        let result = Args::try_parse_from([
            "fleet-preprocessor",
            "process",
            "-i",
            "in",
            "-o",
            "out",
            "--sequential",
            "--workers",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"batch_size": 250, "mode": "streaming"}"#).unwrap();

        let args = Args::parse_from([
            "fleet-preprocessor",
            "process",
            "-i",
            "in",
            "-o",
            "out",
            "--config",
            config_path.to_str().unwrap(),
            "--batch-size",
            "100",
        ]);
        let Command::Process(process_args) = args.command else {
            panic!("expected process command");
        };
        let config = process_args.to_config().unwrap();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.mode, ProcessingMode::Streaming);
    }

    #[test]
    fn test_status_reads_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cp.json");
        let store = JsonCheckpointStore::open(&path);
        store
            .put("bms_a.csv", CheckpointEntry::in_progress(10, 20, 100))
            .unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        show_status(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        assert!(show_status(&temp_dir.path().join("missing.json")).is_err());
    }
}
