//! GPS list-column expansion.
//!
//! Some GPS exports pack several readings into one cell (`"1.0,2.0,3.0"`).
//! The plan is resolved once per file from the leading rows, so every chunk
//! of that file expands to the same columns no matter what its own values
//! look like.

use crate::error::Result;
use crate::schema::{CategorySchema, ColumnType};
use polars::prelude::*;
use tracing::debug;

/// Delimiters tried in priority order
pub const CANDIDATE_DELIMITERS: [char; 3] = [',', '|', ';'];

/// Share of sampled values that must contain a delimiter
const DELIMITER_SHARE: f64 = 0.5;

/// Expansion decision for one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpansion {
    pub column: String,
    pub delimiter: char,
    /// Number of output columns `<column>_1..=<column>_width`
    pub width: usize,
}

impl ColumnExpansion {
    pub fn output_names(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.width).map(move |i| format!("{}_{}", self.column, i))
    }
}

/// File-level set of column expansions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionPlan {
    columns: Vec<ColumnExpansion>,
}

impl ExpansionPlan {
    /// Inspect up to `sample_size` non-null values of each candidate column
    ///
    /// Columns declared numeric by the schema are never expanded.
    pub fn resolve(sample: &DataFrame, sample_size: usize, schema: &CategorySchema) -> Result<Self> {
        let mut columns = Vec::new();

        for column in sample.get_columns() {
            let name = column.name().as_str();
            if column.dtype() != &DataType::String
                || schema.column_type(name) == ColumnType::Numeric
            {
                continue;
            }

            let values: Vec<&str> = column
                .as_materialized_series()
                .str()?
                .into_iter()
                .flatten()
                .take(sample_size)
                .collect();

            if let Some(expansion) = detect_expansion(name, &values) {
                debug!(
                    "Expanding column '{}' on '{}' into {} columns",
                    expansion.column, expansion.delimiter, expansion.width
                );
                columns.push(expansion);
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnExpansion] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Replace every planned column with its fixed-width split
    ///
    /// Short values are padded with nulls; parts beyond the planned width
    /// are dropped.
    pub fn apply(&self, mut df: DataFrame) -> Result<DataFrame> {
        for expansion in &self.columns {
            let position = df.try_get_column_index(&expansion.column)?;

            let parts: Vec<Series> = {
                let values = df
                    .column(&expansion.column)?
                    .as_materialized_series()
                    .str()?;

                let overflow = values
                    .into_iter()
                    .flatten()
                    .filter(|v| v.split(expansion.delimiter).count() > expansion.width)
                    .count();
                if overflow > 0 {
                    debug!(
                        "{} values of '{}' exceed {} parts, extra parts dropped",
                        overflow, expansion.column, expansion.width
                    );
                }

                expansion
                    .output_names()
                    .enumerate()
                    .map(|(index, name)| {
                        StringChunked::from_iter_options(
                            name.into(),
                            values.into_iter().map(|value| {
                                value
                                    .and_then(|v| v.split(expansion.delimiter).nth(index))
                                    .map(str::trim)
                                    .filter(|part| !part.is_empty())
                            }),
                        )
                        .into_series()
                    })
                    .collect()
            };

            df.drop_in_place(&expansion.column)?;
            for (offset, part) in parts.into_iter().enumerate() {
                df.insert_column(position + offset, part)?;
            }
        }
        Ok(df)
    }
}

/// Decide whether sampled values are delimiter-separated lists
fn detect_expansion(column: &str, values: &[&str]) -> Option<ColumnExpansion> {
    if values.is_empty() {
        return None;
    }

    let delimiter = CANDIDATE_DELIMITERS.into_iter().find(|d| {
        let hits = values.iter().filter(|v| v.contains(*d)).count();
        hits as f64 / values.len() as f64 > DELIMITER_SHARE
    })?;

    let width = values
        .iter()
        .map(|v| v.split(delimiter).count())
        .max()
        .unwrap_or(1);

    (width > 1).then(|| ColumnExpansion {
        column: column.to_string(),
        delimiter,
        width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::pipeline::test_support::*;

    fn gps() -> CategorySchema {
        CategorySchema::for_category(Category::Gps)
    }

    #[test]
    fn test_detects_comma_lists() {
        let expansion = detect_expansion("sat_snr", &["1,2,3", "4,5", "6,7,8"]).unwrap();
        assert_eq!(expansion.delimiter, ',');
        assert_eq!(expansion.width, 3);
    }

    #[test]
    fn test_delimiter_priority_and_threshold() {
        // Pipes everywhere, commas in only one of three values
        let expansion = detect_expansion("ids", &["a|b", "c|d,e", "f|g"]).unwrap();
        assert_eq!(expansion.delimiter, '|');

        // Exactly half is not enough
        assert!(detect_expansion("ids", &["a;b", "c"]).is_none());
        assert!(detect_expansion("ids", &[]).is_none());
    }

    #[test]
    fn test_numeric_columns_are_not_candidates() {
        let sample = text_frame(&[
            ("lat", vec![Some("37,5"), Some("37,6")]),
            ("sat_ids", vec![Some("1;2"), Some("3;4")]),
        ]);
        let plan = ExpansionPlan::resolve(&sample, 50, &gps()).unwrap();
        assert_eq!(plan.columns().len(), 1);
        assert_eq!(plan.columns()[0].column, "sat_ids");
    }

    #[test]
    fn test_sample_size_limits_inspection() {
        let sample = text_frame(&[(
            "sat_ids",
            vec![Some("1"), Some("2"), Some("3,4"), Some("5,6"), Some("7,8")],
        )]);
        let plan = ExpansionPlan::resolve(&sample, 2, &gps()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_apply_pads_and_truncates_to_plan_width() {
        let sample = text_frame(&[
            ("device_no", vec![Some("A"), Some("A")]),
            ("sat_snr", vec![Some("1.0,2.0,3.0"), Some("4.0,5.0,6.0")]),
            ("speed", vec![Some("10"), Some("12")]),
        ]);
        let plan = ExpansionPlan::resolve(&sample, 50, &gps()).unwrap();

        // A later chunk with shorter and longer lists
        let chunk = text_frame(&[
            ("device_no", vec![Some("A"), Some("A"), Some("A")]),
            ("sat_snr", vec![Some("7.0"), Some("1,2,3,4"), None]),
            ("speed", vec![Some("1"), Some("2"), Some("3")]),
        ]);
        let df = plan.apply(chunk).unwrap();

        assert_eq!(
            names(&df),
            vec!["device_no", "sat_snr_1", "sat_snr_2", "sat_snr_3", "speed"]
        );
        assert_eq!(
            text_values(&df, "sat_snr_1"),
            vec![Some("7.0".to_string()), Some("1".to_string()), None]
        );
        assert_eq!(
            text_values(&df, "sat_snr_3"),
            vec![None, Some("3".to_string()), None]
        );
    }

    #[test]
    fn test_every_chunk_gets_the_same_columns() {
        let sample = text_frame(&[("sat_ids", vec![Some("1|2"), Some("3|4")])]);
        let plan = ExpansionPlan::resolve(&sample, 50, &gps()).unwrap();

        let first = plan
            .apply(text_frame(&[("sat_ids", vec![Some("1|2")])]))
            .unwrap();
        let second = plan
            .apply(text_frame(&[("sat_ids", vec![Some("9")])]))
            .unwrap();
        assert_eq!(names(&first), names(&second));
    }
}
