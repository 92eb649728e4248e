//! Static column schema per telemetry category.
//!
//! Replaces chunk-local type inference with a fixed table: each column name
//! resolves to a declared type and zero or more physical range rules. The
//! table is configuration, never mutated at runtime.

use crate::models::Category;

/// Declared storage type of a logical column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Coerced to 64-bit float, unparsable values become null
    Numeric,
    /// Kept as text, never numerically inferred
    Text,
    /// Not declared by the schema; preserved as text, never range-validated
    Unknown,
}

/// One side of a range check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Inclusive(f64),
    Exclusive(f64),
    Unbounded,
}

/// How a range rule selects columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMatch {
    /// Case-insensitive substring of the column name
    Contains(&'static str),
    /// Exact column name
    Exact(&'static str),
}

impl ColumnMatch {
    pub fn matches(&self, column: &str) -> bool {
        match self {
            ColumnMatch::Contains(pattern) => column.to_lowercase().contains(pattern),
            ColumnMatch::Exact(name) => column == *name,
        }
    }
}

/// Physically plausible bounds for the columns a pattern selects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeRule {
    pub column: ColumnMatch,
    pub lower: Bound,
    pub upper: Bound,
}

impl RangeRule {
    const fn new(column: ColumnMatch, lower: Bound, upper: Bound) -> Self {
        Self {
            column,
            lower,
            upper,
        }
    }

    /// Whether a present numeric value lies within the rule
    pub fn accepts(&self, value: f64) -> bool {
        let above_lower = match self.lower {
            Bound::Inclusive(min) => value >= min,
            Bound::Exclusive(min) => value > min,
            Bound::Unbounded => true,
        };
        let below_upper = match self.upper {
            Bound::Inclusive(max) => value <= max,
            Bound::Exclusive(max) => value < max,
            Bound::Unbounded => true,
        };
        above_lower && below_upper
    }
}

/// Identifier and time columns that must stay textual in every category
pub const IDENTIFIER_COLUMNS: &[&str] = &["device_no", "time", "msg_time", "measured_month"];

/// Columns carrying timestamps that get year repair and parsing
pub const TIMESTAMP_COLUMNS: &[&str] = &["time", "msg_time", "measured_month", "start_time"];

const BATTERY_TEXT_COLUMNS: &[&str] = &[
    "device_no",
    "time",
    "msg_time",
    "measured_month",
    "start_time",
    "end_time",
    "car_type",
    "mode",
    "source",
    "state",
];

/// Battery columns are numeric when their name contains one of these
const BATTERY_NUMERIC_PATTERNS: &[&str] = &[
    "soc", "soh", "volt", "temp", "current", "spd", "cumul", "odometer", "chrg_", "cell_", "mod_",
    "pack_", "ext_", "op_", "ins_", "hvac_", "_pw", "_count", "_no",
];

const BATTERY_RANGE_RULES: &[RangeRule] = &[
    RangeRule::new(
        ColumnMatch::Contains("soc"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(100.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("soh"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(100.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("_volt"),
        Bound::Unbounded,
        Bound::Inclusive(3000.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("_temp"),
        Bound::Inclusive(-35.0),
        Bound::Inclusive(80.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("_current"),
        Bound::Inclusive(-500.0),
        Bound::Inclusive(500.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("emobility_spd"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(180.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("cell_volt_"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(6.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("cumul"),
        Bound::Unbounded,
        Bound::Inclusive(1_000_000.0),
    ),
    RangeRule::new(
        ColumnMatch::Contains("odometer"),
        Bound::Exclusive(0.0),
        Bound::Inclusive(2_000_000.0),
    ),
];

const GPS_NUMERIC_COLUMNS: &[&str] = &["lat", "lng", "speed", "direction", "fuel_pct", "hdop"];

const GPS_TEXT_COLUMNS: &[&str] = &[
    "device_no",
    "time",
    "msg_time",
    "measured_month",
    "start_time",
    "mode",
    "source",
    "state",
    "car_type",
];

const GPS_RANGE_RULES: &[RangeRule] = &[
    RangeRule::new(
        ColumnMatch::Exact("lat"),
        Bound::Inclusive(-90.0),
        Bound::Inclusive(90.0),
    ),
    RangeRule::new(
        ColumnMatch::Exact("lng"),
        Bound::Inclusive(-180.0),
        Bound::Inclusive(180.0),
    ),
    RangeRule::new(
        ColumnMatch::Exact("speed"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(300.0),
    ),
    RangeRule::new(
        ColumnMatch::Exact("direction"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(360.0),
    ),
    RangeRule::new(
        ColumnMatch::Exact("fuel_pct"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(100.0),
    ),
    RangeRule::new(
        ColumnMatch::Exact("hdop"),
        Bound::Inclusive(0.0),
        Bound::Inclusive(50.0),
    ),
];

/// Schema table for one category
#[derive(Debug, Clone, Copy)]
pub struct CategorySchema {
    category: Category,
    text_columns: &'static [&'static str],
    range_rules: &'static [RangeRule],
}

impl CategorySchema {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Battery => Self {
                category,
                text_columns: BATTERY_TEXT_COLUMNS,
                range_rules: BATTERY_RANGE_RULES,
            },
            Category::Gps => Self {
                category,
                text_columns: GPS_TEXT_COLUMNS,
                range_rules: GPS_RANGE_RULES,
            },
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Declared type of a column
    pub fn column_type(&self, column: &str) -> ColumnType {
        if self.text_columns.contains(&column) || IDENTIFIER_COLUMNS.contains(&column) {
            return ColumnType::Text;
        }

        let numeric = match self.category {
            Category::Battery => {
                let lower = column.to_lowercase();
                BATTERY_NUMERIC_PATTERNS.iter().any(|p| lower.contains(p))
            }
            Category::Gps => GPS_NUMERIC_COLUMNS.contains(&column),
        };

        if numeric {
            ColumnType::Numeric
        } else {
            ColumnType::Unknown
        }
    }

    /// Range rules that apply to a column, in table order
    ///
    /// Only numeric columns are range-validated; unknown and text columns
    /// return no rules even when a pattern would match their name.
    pub fn rules_for(&self, column: &str) -> Vec<&'static RangeRule> {
        if self.column_type(column) != ColumnType::Numeric {
            return Vec::new();
        }
        self.range_rules
            .iter()
            .filter(|rule| rule.column.matches(column))
            .collect()
    }
}
