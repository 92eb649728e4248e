//! CSV output for processed chunks
//!
//! The writer appends chunk after chunk to one file, emitting the header
//! only for the first chunk of a fresh output. Every write is flushed and
//! synced before its resulting file length is handed back, so a checkpoint
//! recorded afterwards never points past data that is actually on disk.

use super::reader::ChunkedReader;
use crate::error::{PreprocessError, Result};
use polars::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Canonical layout for datetime columns in written CSV
///
/// Whole seconds print without a fraction; sub-second values keep their
/// milliseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Appending CSV writer for one output file
#[derive(Debug)]
pub struct StreamingWriter {
    path: PathBuf,
    header: Option<Vec<String>>,
    started: bool,
}

impl StreamingWriter {
    /// Writer for a fresh output; the first write replaces any existing file
    pub fn create(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            header: None,
            started: false,
        }
    }

    /// Reopen an output after its first `committed_bytes` bytes
    ///
    /// Anything past the committed length was written by a chunk that never
    /// reached its checkpoint, and is cut off before appending resumes.
    pub fn resume(path: &Path, committed_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        let current = file.metadata()?.len();
        if current > committed_bytes {
            debug!(
                "Truncating {} from {} to {} bytes",
                path.display(),
                current,
                committed_bytes
            );
            file.set_len(committed_bytes)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            header: read_header(path)?,
            started: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether any chunk (or a header) has reached the file
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Append one chunk, returning the file length afterwards
    ///
    /// Every chunk must carry the same columns in the same order as the
    /// first one; a mismatch is reported rather than written.
    pub fn write(&mut self, df: &mut DataFrame) -> Result<u64> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        match &self.header {
            Some(expected) if *expected != names => {
                return Err(PreprocessError::SchemaDrift {
                    path: self.path.clone(),
                    expected: expected.join(","),
                    found: names.join(","),
                });
            }
            Some(_) => {}
            None => self.header = Some(names),
        }

        let include_header = !self.started;
        let file = if include_header {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            File::create(&self.path)?
        } else {
            OpenOptions::new().append(true).open(&self.path)?
        };

        let mut buffered = BufWriter::new(file);
        CsvWriter::new(&mut buffered)
            .include_header(include_header)
            .with_datetime_format(Some(TIMESTAMP_FORMAT.to_string()))
            .finish(df)
            .map_err(|e| PreprocessError::ProcessingFailed {
                path: self.path.clone(),
                reason: format!("CSV write failed: {}", e),
            })?;
        buffered.flush()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;

        self.started = true;
        Ok(file.metadata()?.len())
    }
}

/// Split a written header line into column names
fn parse_header_line(line: &str) -> Vec<String> {
    line.trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|field| field.trim().trim_matches('"').to_string())
        .collect()
}

/// Column names from the first line of a CSV file, if it has one
pub fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
    let mut line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_header_line(&line)))
}

/// Pad missing columns with nulls and order columns as `columns`
fn align_columns(mut df: DataFrame, columns: &[String]) -> Result<DataFrame> {
    let height = df.height();
    for name in columns {
        if df.get_column_index(name).is_none() {
            df.with_column(Series::full_null(name.as_str().into(), height, &DataType::String))?;
        }
    }
    Ok(df.select(columns.iter().cloned())?)
}

/// Merge per-file outputs into one CSV with the union of their columns
///
/// Columns appear in first-seen order across `parts`; rows keep part order.
/// Returns the number of data rows written.
pub fn merge_parts(parts: &[PathBuf], output: &Path, batch_size: usize) -> Result<usize> {
    let mut columns: Vec<String> = Vec::new();
    for part in parts {
        for name in read_header(part)?.unwrap_or_default() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut writer = StreamingWriter::create(output);
    let mut rows = 0usize;
    for part in parts {
        for chunk in ChunkedReader::open(part, batch_size)? {
            let mut df = align_columns(chunk?.frame, &columns)?;
            rows += df.height();
            writer.write(&mut df)?;
        }
    }

    if !writer.has_started() && !columns.is_empty() {
        let empty: Vec<Column> = columns
            .iter()
            .map(|name| Series::new_empty(name.as_str().into(), &DataType::String).into_column())
            .collect();
        writer.write(&mut DataFrame::new(empty)?)?;
    }

    debug!(
        "Merged {} parts into {} ({} rows, {} columns)",
        parts.len(),
        output.display(),
        rows,
        columns.len()
    );
    Ok(rows)
}
