//! Per-chunk transformation stages.
//!
//! A chunk flows through cleaning, GPS expansion, range validation and type
//! coercion (`process_chunk`), then timestamp normalization and duplicate
//! removal (`finalize`). Streaming mode finalizes every chunk on its own;
//! whole-file mode stacks processed chunks and finalizes once. The
//! per-value work is identical either way, so both paths agree except for
//! the scope of deduplication.

pub mod cleaning;
pub mod coercion;
pub mod dedup;
pub mod expander;
pub mod timestamps;
pub mod validator;

use crate::error::Result;
use crate::models::Category;
use crate::schema::CategorySchema;
use polars::prelude::*;

pub use expander::ExpansionPlan;

/// Stage pipeline resolved once per file
#[derive(Debug, Clone)]
pub struct FilePipeline {
    schema: CategorySchema,
    expansion: Option<ExpansionPlan>,
}

impl FilePipeline {
    /// Pipeline for a category with no column expansion
    pub fn new(category: Category) -> Self {
        Self {
            schema: CategorySchema::for_category(category),
            expansion: None,
        }
    }

    /// Resolve the file-level expansion plan from a sample of leading rows
    ///
    /// Only GPS files expand list columns. The sample must come from the
    /// start of the file so every run of that file sees the same plan.
    pub fn resolve(category: Category, leading_rows: DataFrame, sample_size: usize) -> Result<Self> {
        let mut pipeline = Self::new(category);
        if category == Category::Gps {
            let sample = cleaning::clean_chunk(leading_rows)?;
            pipeline.expansion = Some(ExpansionPlan::resolve(
                &sample,
                sample_size,
                &pipeline.schema,
            )?);
        }
        Ok(pipeline)
    }

    pub fn schema(&self) -> &CategorySchema {
        &self.schema
    }

    pub fn expansion(&self) -> Option<&ExpansionPlan> {
        self.expansion.as_ref()
    }

    /// Clean, expand, validate and coerce one raw chunk
    pub fn process_chunk(&self, raw: DataFrame) -> Result<DataFrame> {
        let df = cleaning::clean_chunk(raw)?;
        let df = match &self.expansion {
            Some(plan) => plan.apply(df)?,
            None => df,
        };
        let df = validator::validate_ranges(df, &self.schema)?;
        coercion::coerce_types(df, &self.schema)
    }

    /// Normalize timestamps and drop exact duplicates within this unit
    pub fn finalize(&self, df: DataFrame) -> Result<DataFrame> {
        let df = timestamps::normalize_timestamps(df)?;
        dedup::remove_duplicates(df)
    }
}

/// Rebuild a text column through a per-value mapping, keeping its position
pub(crate) fn map_text_column<F>(df: &mut DataFrame, name: &str, f: F) -> Result<()>
where
    F: FnMut(Option<&str>) -> Option<String>,
{
    let mapped = {
        let values = df.column(name)?.as_materialized_series().str()?;
        StringChunked::from_iter_options(name.into(), values.into_iter().map(f))
    };
    df.with_column(mapped.into_series())?;
    Ok(())
}

/// Owned column names, for loops that mutate the frame
pub(crate) fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

pub(crate) fn is_text(df: &DataFrame, name: &str) -> Result<bool> {
    Ok(df.column(name)?.dtype() == &DataType::String)
}

#[cfg(test)]
pub(crate) mod test_support {
    use polars::prelude::*;

    /// Build a text-only frame the way the chunked reader produces it
    pub fn text_frame(columns: &[(&str, Vec<Option<&str>>)]) -> DataFrame {
        let columns: Vec<Column> = columns
            .iter()
            .map(|(name, values)| {
                StringChunked::from_iter_options((*name).into(), values.iter().copied())
                    .into_series()
                    .into_column()
            })
            .collect();
        DataFrame::new(columns).unwrap()
    }

    pub fn text_values(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    pub fn float_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect()
    }

    pub fn names(df: &DataFrame) -> Vec<String> {
        df.get_column_names().iter().map(|s| s.to_string()).collect()
    }
}
