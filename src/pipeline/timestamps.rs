//! Timestamp repair and parsing.
//!
//! Some exports drop the century from the year (`23-06-15 10:00:00`). Values
//! that start with a two-digit year followed by a date separator get `20`
//! prefixed before parsing. Anything that still fails to parse becomes null.

use crate::error::Result;
use crate::schema::TIMESTAMP_COLUMNS;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::debug;

static TWO_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}[-/.]").expect("Invalid two-digit year pattern"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y%m%d%H%M%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

const MONTH_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Prefix `20` to a two-digit-year value, leaving others untouched
pub fn repair_two_digit_year(value: &str) -> Cow<'_, str> {
    if TWO_DIGIT_YEAR.is_match(value) {
        Cow::Owned(format!("20{}", value))
    } else {
        Cow::Borrowed(value)
    }
}

/// Parse a timestamp in any of the accepted layouts
///
/// Offsets in RFC 3339 values are dropped, keeping the wall-clock time.
/// Month-only values (`2023-06`) resolve to the first of the month.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let value = repair_two_digit_year(value);

    if let Some(parsed) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&value, format).ok())
    {
        return Some(parsed);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value) {
        return Some(parsed.naive_local());
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&value, format).ok())
    {
        return date.and_hms_opt(0, 0, 0);
    }

    let first_of_month = format!("{}{}01", value, month_separator(&value));
    MONTH_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&first_of_month, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn month_separator(value: &str) -> char {
    value
        .chars()
        .find(|c| matches!(c, '-' | '/' | '.'))
        .unwrap_or('-')
}

/// Parse every known timestamp column into a millisecond datetime column
pub fn normalize_timestamps(mut df: DataFrame) -> Result<DataFrame> {
    for name in TIMESTAMP_COLUMNS {
        let Some(column) = df.column(name).ok() else {
            continue;
        };
        if column.dtype() != &DataType::String {
            continue;
        }

        let mut failed = 0usize;
        let parsed = {
            let values = column.as_materialized_series().str()?;
            Int64Chunked::from_iter_options(
                (*name).into(),
                values.into_iter().map(|value| {
                    let value = value?;
                    let parsed = parse_timestamp(value).map(|t| t.and_utc().timestamp_millis());
                    if parsed.is_none() {
                        failed += 1;
                    }
                    parsed
                }),
            )
            .into_datetime(TimeUnit::Milliseconds, None)
        };

        if failed > 0 {
            debug!("{} values in '{}' could not be parsed as timestamps", failed, name);
        }
        df.with_column(parsed.into_series())?;
    }
    Ok(df)
}
