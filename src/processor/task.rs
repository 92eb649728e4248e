//! Processing of a single input file
//!
//! A task owns one input, one output and one checkpoint key. It decides
//! where to start from the checkpoint, runs every chunk through the stage
//! pipeline, and records progress only after the matching output is on
//! disk.

use super::reader::{ChunkedReader, count_data_rows, read_batch};
use super::writer::StreamingWriter;
use crate::checkpoint::CheckpointStore;
use crate::config::ProcessingMode;
use crate::error::Result;
use crate::models::{Category, CheckpointEntry, CheckpointStatus, FileOutcome};
use crate::pipeline::FilePipeline;
use polars::prelude::DataFrame;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Work unit for one input file
pub struct FileTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub category: Category,
    pub key: String,
    pub mode: ProcessingMode,
    /// Files larger than this stream when `mode` is Auto
    pub streaming_threshold: u64,
    pub batch_size: usize,
    pub sample_size: usize,
    pub store: Arc<dyn CheckpointStore>,
}

impl FileTask {
    /// Process the file end to end
    pub fn run(&self) -> Result<FileOutcome> {
        let total = count_data_rows(&self.input)?;
        let existing = self.store.get(&self.key);

        if let Some(entry) = &existing {
            if entry.is_complete_for(total) {
                debug!("{} already complete ({} rows)", self.input.display(), total);
                return Ok(FileOutcome::AlreadyComplete);
            }
        }

        if total == 0 {
            debug!("{} has no data rows", self.input.display());
            self.commit(CheckpointEntry::completed(0, None))?;
            return Ok(FileOutcome::Empty);
        }

        let pipeline = match self.category {
            Category::Gps => FilePipeline::resolve(
                Category::Gps,
                read_batch(&self.input, 0, self.batch_size.max(self.sample_size))?,
                self.sample_size,
            )?,
            category => FilePipeline::new(category),
        };

        match self.resolve_mode()? {
            ProcessingMode::Streaming => self.run_streaming(total, existing.as_ref(), &pipeline),
            _ => self.run_whole_file(total, &pipeline),
        }
    }

    /// Concrete mode for this file
    pub fn resolve_mode(&self) -> Result<ProcessingMode> {
        if self.mode != ProcessingMode::Auto {
            return Ok(self.mode);
        }
        let size = std::fs::metadata(&self.input)?.len();
        if size > self.streaming_threshold {
            debug!(
                "{} is {} bytes, above the {} byte threshold; streaming",
                self.input.display(),
                size,
                self.streaming_threshold
            );
            Ok(ProcessingMode::Streaming)
        } else {
            Ok(ProcessingMode::WholeFile)
        }
    }

    /// Record progress, never moving an existing entry backwards
    ///
    /// A file reprocessed from the start (lost output, changed input) keeps
    /// its old entry until the new run catches up with it. Until then a
    /// resume finds the output shorter than the entry claims and starts
    /// over again.
    fn commit(&self, entry: CheckpointEntry) -> Result<()> {
        if let Some(current) = self.store.get(&self.key) {
            if entry.processed_rows < current.processed_rows {
                debug!(
                    "Checkpoint {} stays at row {} while reprocessing (at {})",
                    self.key, current.processed_rows, entry.processed_rows
                );
                return Ok(());
            }
        }
        self.store.put(&self.key, entry)
    }

    /// Assemble every chunk, then normalize, dedup and write once
    fn run_whole_file(&self, total: u64, pipeline: &FilePipeline) -> Result<FileOutcome> {
        let mut assembled: Option<DataFrame> = None;
        for chunk in ChunkedReader::with_total(&self.input, self.batch_size, total) {
            let df = pipeline.process_chunk(chunk?.frame)?;
            assembled = Some(match assembled.take() {
                Some(mut acc) => {
                    acc.vstack_mut(&df)?;
                    acc
                }
                None => df,
            });
        }

        let Some(df) = assembled else {
            self.commit(CheckpointEntry::completed(total, None))?;
            return Ok(FileOutcome::Empty);
        };

        let mut df = pipeline.finalize(df)?;
        let length = StreamingWriter::create(&self.output).write(&mut df)?;
        self.commit(CheckpointEntry::completed(total, Some(length)))?;

        info!(
            "Processed {} ({} rows written)",
            self.input.display(),
            df.height()
        );
        Ok(FileOutcome::Success {
            rows_written: df.height(),
        })
    }

    /// Where a streaming run picks up, with a writer positioned there
    fn resume_point(&self, existing: Option<&CheckpointEntry>) -> Result<(u64, StreamingWriter)> {
        let Some(entry) = existing.filter(|e| e.processed_rows > 0) else {
            return Ok((0, StreamingWriter::create(&self.output)));
        };

        let on_disk = std::fs::metadata(&self.output).map(|m| m.len()).ok();
        match (entry.output_bytes, on_disk) {
            (Some(committed), Some(length)) if committed > 0 && length >= committed => {
                info!(
                    "Resuming {} at row {} of {}",
                    self.input.display(),
                    entry.processed_rows,
                    entry.total_rows
                );
                Ok((
                    entry.processed_rows,
                    StreamingWriter::resume(&self.output, committed)?,
                ))
            }
            _ => {
                warn!(
                    "Output {} does not match checkpoint {}, restarting from the first row",
                    self.output.display(),
                    self.key
                );
                Ok((0, StreamingWriter::create(&self.output)))
            }
        }
    }

    /// Process, write and checkpoint chunk by chunk
    fn run_streaming(
        &self,
        total: u64,
        existing: Option<&CheckpointEntry>,
        pipeline: &FilePipeline,
    ) -> Result<FileOutcome> {
        let (start, mut writer) = self.resume_point(existing)?;

        let mut rows_written = 0usize;
        let mut committed = start;
        let mut length = None;
        let reader = ChunkedReader::with_total(&self.input, self.batch_size, total).starting_at(start);

        for chunk in reader {
            let chunk = chunk?;
            let mut df = pipeline.finalize(pipeline.process_chunk(chunk.frame)?)?;
            let bytes = writer.write(&mut df)?;
            self.commit(CheckpointEntry::in_progress(chunk.end, total, bytes))?;

            rows_written += df.height();
            committed = chunk.end;
            length = Some(bytes);
            debug!(
                "Committed rows {}..{} of {} for {}",
                chunk.start,
                chunk.end,
                total,
                self.input.display()
            );
        }

        if !writer.has_started() {
            return Ok(FileOutcome::Empty);
        }

        let finished = self
            .store
            .get(&self.key)
            .is_some_and(|entry| entry.is_complete_for(total));
        if !finished {
            // Reader ran out before the counted rows (file shrank)
            self.commit(CheckpointEntry {
                processed_rows: committed.max(total),
                total_rows: total,
                status: CheckpointStatus::Completed,
                output_bytes: length.or(existing.and_then(|e| e.output_bytes)),
            })?;
        }

        info!(
            "Processed {} ({} rows written from row {})",
            self.input.display(),
            rows_written,
            start
        );
        Ok(FileOutcome::Success { rows_written })
    }
}
