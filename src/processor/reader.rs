//! Chunked CSV reading with restartable offsets
//!
//! A data row is a non-blank line after the header line. Row counting, the
//! skip on resume and batch parsing all use that definition, so offsets
//! recorded in checkpoints always mean the same rows. Batches are aligned to
//! `batch_size` from the true start of the file, and every column is read as
//! text: typing is the job of the coercion stage, never of the CSV parser.
//!
//! A reader makes one sequential pass over its file. Lines are gathered per
//! batch and handed to polars together with the header line.

use crate::error::{PreprocessError, Result};
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use tracing::debug;

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| matches!(b, b'\n' | b'\r'))
}

/// Read the next non-blank line into `line`; false at end of file
fn next_data_line(reader: &mut impl BufRead, line: &mut Vec<u8>) -> Result<bool> {
    loop {
        line.clear();
        if reader.read_until(b'\n', line)? == 0 {
            return Ok(false);
        }
        if !is_blank(line) {
            if line.last() != Some(&b'\n') {
                line.push(b'\n');
            }
            return Ok(true);
        }
    }
}

/// Count data rows (non-blank lines after the header)
pub fn count_data_rows(path: &Path) -> Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let mut lines = 0u64;
    while next_data_line(&mut reader, &mut line)? {
        lines += 1;
    }
    Ok(lines.saturating_sub(1))
}

/// Sequential line access to one CSV file
struct RowSource {
    path: PathBuf,
    lines: BufReader<File>,
    header: Vec<u8>,
    line: Vec<u8>,
}

impl RowSource {
    fn open(path: &Path) -> Result<Self> {
        let mut lines = BufReader::new(File::open(path)?);
        let mut header = Vec::new();
        if !next_data_line(&mut lines, &mut header)? {
            header.clear();
        }
        Ok(Self {
            path: path.to_path_buf(),
            lines,
            header,
            line: Vec::new(),
        })
    }

    /// Advance past up to `rows` data rows, returning how many were skipped
    fn skip(&mut self, rows: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < rows && next_data_line(&mut self.lines, &mut self.line)? {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Parse up to `rows` data rows; `None` once the file is exhausted
    fn read(&mut self, rows: u64) -> Result<Option<(DataFrame, u64)>> {
        let mut buffer = self.header.clone();
        let mut read = 0u64;
        while read < rows && next_data_line(&mut self.lines, &mut self.line)? {
            buffer.extend_from_slice(&self.line);
            read += 1;
        }
        if read == 0 {
            return Ok(None);
        }

        let frame = parse_rows(&self.path, buffer)?;
        if frame.height() as u64 != read {
            // Quoted line breaks would shift every later offset
            return Err(PreprocessError::ProcessingFailed {
                path: self.path.clone(),
                reason: format!("parsed {} records from {} lines", frame.height(), read),
            });
        }
        Ok(Some((frame, read)))
    }

    /// Empty frame carrying the header's column names
    fn header_frame(&self) -> Result<DataFrame> {
        if self.header.is_empty() {
            return Ok(DataFrame::empty());
        }
        parse_rows(&self.path, self.header.clone())
    }
}

fn parse_rows(path: &Path, bytes: Vec<u8>) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| PreprocessError::ProcessingFailed {
            path: path.to_path_buf(),
            reason: format!("CSV parse failed: {}", e),
        })
}

/// Read one batch of rows as text columns
///
/// `offset` is the number of data rows to skip after the header. Past the
/// end of the file the frame has the header's columns and no rows.
pub fn read_batch(path: &Path, offset: u64, rows: usize) -> Result<DataFrame> {
    let mut source = RowSource::open(path)?;
    source.skip(offset)?;
    match source.read(rows as u64)? {
        Some((frame, _)) => Ok(frame),
        None => source.header_frame(),
    }
}

/// A raw row-batch with its position in the file
#[derive(Debug)]
pub struct RawChunk {
    /// Data-row offset of the first row in this chunk
    pub start: u64,
    /// Offset just past this chunk's row span
    pub end: u64,
    pub frame: DataFrame,
}

/// Lazy, finite sequence of raw chunks starting at a row offset
///
/// The sequence never reaches past `total_rows`, even when the file has
/// grown since it was counted; those rows belong to a later run.
pub struct ChunkedReader {
    path: PathBuf,
    batch_size: usize,
    total_rows: u64,
    next_offset: u64,
    source: Option<RowSource>,
    exhausted: bool,
}

impl ChunkedReader {
    /// Open a reader, counting the file's data rows
    pub fn open(path: &Path, batch_size: usize) -> Result<Self> {
        let total_rows = count_data_rows(path)?;
        Ok(Self::with_total(path, batch_size, total_rows))
    }

    /// Create a reader when the row count is already known
    pub fn with_total(path: &Path, batch_size: usize, total_rows: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            batch_size: batch_size.max(1),
            total_rows,
            next_offset: 0,
            source: None,
            exhausted: false,
        }
    }

    /// Skip `offset` data rows before the first batch
    ///
    /// Batches that follow are aligned to `batch_size` boundaries counted
    /// from the start of the file, not from `offset`. Checkpoints are only
    /// ever recorded at those boundaries (or at the end of file), so in
    /// practice `offset` is itself a boundary.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.next_offset = offset;
        self
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Next batch boundary after `start`, capped at the counted rows
    fn batch_end(&self, start: u64) -> u64 {
        let batch = self.batch_size as u64;
        ((start / batch + 1) * batch).min(self.total_rows)
    }

    fn advance(&mut self) -> Result<Option<RawChunk>> {
        if self.next_offset >= self.total_rows {
            return Ok(None);
        }

        if self.source.is_none() {
            let mut source = RowSource::open(&self.path)?;
            let skipped = source.skip(self.next_offset)?;
            if skipped < self.next_offset {
                debug!(
                    "{} has only {} rows, fewer than the offset {}",
                    self.path.display(),
                    skipped,
                    self.next_offset
                );
                return Ok(None);
            }
            self.source = Some(source);
        }

        let start = self.next_offset;
        let requested = self.batch_end(start) - start;
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        let Some((frame, read)) = source.read(requested)? else {
            return Ok(None);
        };

        let end = start + read;
        if read < requested {
            // File shrank since it was counted
            self.total_rows = end;
        }
        self.next_offset = end;
        debug!(
            "Read rows {}..{} of {} from {}",
            start,
            end,
            self.total_rows,
            self.path.display()
        );
        Ok(Some(RawChunk { start, end, frame }))
    }
}

impl Iterator for ChunkedReader {
    type Item = Result<RawChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.advance().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.exhausted = true;
        }
        item
    }
}
