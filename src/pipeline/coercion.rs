//! Schema-driven type coercion.
//!
//! Numeric columns become 64-bit floats; anything that does not parse to a
//! finite number becomes null. Text and unknown columns stay text, so
//! identifiers such as `device_no = "00123"` keep their leading zeros.

use super::column_names;
use crate::error::Result;
use crate::schema::{CategorySchema, ColumnType};
use polars::prelude::*;

fn parse_finite(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Cast every column to its declared type
pub fn coerce_types(mut df: DataFrame, schema: &CategorySchema) -> Result<DataFrame> {
    for name in column_names(&df) {
        let dtype = df.column(&name)?.dtype().clone();
        let coerced = match (schema.column_type(&name), &dtype) {
            (ColumnType::Numeric, DataType::Float64) => continue,
            (ColumnType::Numeric, DataType::String) => {
                let values = df.column(&name)?.as_materialized_series().str()?;
                Float64Chunked::from_iter_options(
                    name.as_str().into(),
                    values.into_iter().map(|v| v.and_then(parse_finite)),
                )
                .into_series()
            }
            (ColumnType::Numeric, _) => df
                .column(&name)?
                .as_materialized_series()
                .cast(&DataType::Float64)?,
            (ColumnType::Text | ColumnType::Unknown, DataType::String) => continue,
            (ColumnType::Text | ColumnType::Unknown, _) => df
                .column(&name)?
                .as_materialized_series()
                .cast(&DataType::String)?,
        };
        df.with_column(coerced)?;
    }
    Ok(df)
}
