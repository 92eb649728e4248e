//! Structural cleanup of raw chunks.
//!
//! Applied in order: drop a leading header-echo row, drop rows that are
//! entirely blank, trim column names and values, then turn empty strings
//! into nulls. Only text columns are touched; the reader never produces
//! anything else.

use super::{column_names, is_text, map_text_column};
use crate::error::Result;
use polars::prelude::*;
use tracing::debug;

/// Run every cleaning step over one chunk
pub fn clean_chunk(df: DataFrame) -> Result<DataFrame> {
    let df = drop_header_echo(df)?;
    let df = drop_blank_rows(df)?;
    let df = trim_column_names(df)?;
    let df = trim_values(df)?;
    replace_empty_with_null(df)
}

/// Whether a cell looks like a separator rule such as `----` or `--- ---`
fn is_separator(cell: &str) -> bool {
    let trimmed = cell.trim();
    !trimmed.is_empty()
        && trimmed.split_whitespace().all(|part| part.len() >= 2 && part.chars().all(|c| c == '-'))
}

/// Whether the first row is a repeated header or separator line
///
/// True when any non-null cell is a run of hyphens, or when every non-null
/// cell repeats its own column name. Ordinary data, including dates,
/// never matches.
pub fn is_header_echo(df: &DataFrame) -> Result<bool> {
    if df.height() == 0 {
        return Ok(false);
    }

    let mut present = 0usize;
    let mut echoed = 0usize;
    for column in df.get_columns() {
        if column.dtype() != &DataType::String {
            return Ok(false);
        }
        let Some(cell) = column.as_materialized_series().str()?.get(0) else {
            continue;
        };
        if is_separator(cell) {
            return Ok(true);
        }
        present += 1;
        if cell.trim() == column.name().as_str().trim() {
            echoed += 1;
        }
    }

    Ok(present > 0 && present == echoed)
}

fn drop_header_echo(df: DataFrame) -> Result<DataFrame> {
    if is_header_echo(&df)? {
        debug!("Dropping header echo row");
        return Ok(df.slice(1, df.height() - 1));
    }
    Ok(df)
}

/// Drop rows where every cell is null or whitespace
pub fn drop_blank_rows(df: DataFrame) -> Result<DataFrame> {
    let mut keep = vec![false; df.height()];

    for column in df.get_columns() {
        let series = column.as_materialized_series();
        if series.dtype() == &DataType::String {
            for (row, value) in series.str()?.into_iter().enumerate() {
                if value.is_some_and(|v| !v.trim().is_empty()) {
                    keep[row] = true;
                }
            }
        } else {
            for (row, present) in series.is_not_null().into_iter().enumerate() {
                if present == Some(true) {
                    keep[row] = true;
                }
            }
        }
    }

    let kept = keep.iter().filter(|k| **k).count();
    if kept == df.height() {
        return Ok(df);
    }

    debug!("Dropping {} blank rows", df.height() - kept);
    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Strip surrounding whitespace from column names
pub fn trim_column_names(mut df: DataFrame) -> Result<DataFrame> {
    let trimmed: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.as_str().trim().to_string())
        .collect();
    df.set_column_names(trimmed)?;
    Ok(df)
}

/// Strip surrounding whitespace from every text value
pub fn trim_values(mut df: DataFrame) -> Result<DataFrame> {
    for name in column_names(&df) {
        if is_text(&df, &name)? {
            map_text_column(&mut df, &name, |v| v.map(|s| s.trim().to_string()))?;
        }
    }
    Ok(df)
}

/// Represent empty text as missing
pub fn replace_empty_with_null(mut df: DataFrame) -> Result<DataFrame> {
    for name in column_names(&df) {
        if is_text(&df, &name)? {
            map_text_column(&mut df, &name, |v| {
                v.filter(|s| !s.is_empty()).map(str::to_string)
            })?;
        }
    }
    Ok(df)
}
