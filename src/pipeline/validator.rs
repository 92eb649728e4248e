//! Physical range validation.
//!
//! Out-of-range readings are nulled in place, never dropped with their row:
//! the rest of a row (its timestamp, other sensors) stays usable. A value
//! must satisfy every rule that matches its column.

use super::{column_names, map_text_column};
use crate::error::Result;
use crate::schema::{CategorySchema, RangeRule};
use polars::prelude::*;
use tracing::debug;

fn accepted(rules: &[&RangeRule], value: f64) -> bool {
    rules.iter().all(|rule| rule.accepts(value))
}

/// Null every present numeric value that violates a matching range rule
///
/// Values that do not parse as numbers are left for the coercion stage.
/// The row count never changes.
pub fn validate_ranges(mut df: DataFrame, schema: &CategorySchema) -> Result<DataFrame> {
    for name in column_names(&df) {
        let rules = schema.rules_for(&name);
        if rules.is_empty() {
            continue;
        }

        let mut nulled = 0usize;
        let dtype = df.column(&name)?.dtype().clone();
        match dtype {
            DataType::String => {
                map_text_column(&mut df, &name, |value| {
                    let v = value?;
                    match v.trim().parse::<f64>() {
                        Ok(number) if !accepted(&rules, number) => {
                            nulled += 1;
                            None
                        }
                        _ => Some(v.to_string()),
                    }
                })?;
            }
            DataType::Float64 => {
                let filtered = {
                    let values = df.column(&name)?.as_materialized_series().f64()?;
                    Float64Chunked::from_iter_options(
                        name.as_str().into(),
                        values.into_iter().map(|value| {
                            let number = value?;
                            if accepted(&rules, number) {
                                Some(number)
                            } else {
                                nulled += 1;
                                None
                            }
                        }),
                    )
                };
                df.with_column(filtered.into_series())?;
            }
            _ => continue,
        }

        if nulled > 0 {
            debug!("Nulled {} out-of-range values in '{}'", nulled, name);
        }
    }
    Ok(df)
}
