//! Exact duplicate row removal.

use crate::error::Result;
use polars::prelude::*;
use tracing::debug;

/// Drop rows identical in every column, keeping the first occurrence
///
/// Row order of the survivors is preserved.
pub fn remove_duplicates(df: DataFrame) -> Result<DataFrame> {
    if df.height() < 2 {
        return Ok(df);
    }

    let before = df.height();
    let deduped = df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;

    if deduped.height() < before {
        debug!("Removed {} duplicate rows", before - deduped.height());
    }
    Ok(deduped)
}
