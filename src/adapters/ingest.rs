//! Cleaning of exported spreadsheet rows before they enter the record store.
//!
//! Rows arrive as JSON objects (one per spreadsheet row). Cleaning:
//! - drops rows whose cells are all null or blank
//! - trims every cell and stores it as text, blank cells become `null`
//! - rewrites the `DateOfBirth` column as `DD-MM-YYYY`
//!
//! Dates that match none of the accepted formats become `null`.

use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};

use crate::domain::RawRecord;

/// Column holding the date of birth.
pub const DATE_OF_BIRTH_COLUMN: &str = "DateOfBirth";

/// Output format for standardized dates.
pub const DATE_OUTPUT_FORMAT: &str = "%d-%m-%Y";

/// Accepted input date formats, tried in order.
const DATE_INPUT_FORMATS: [&str; 8] = [
    "%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d", "%Y/%m/%d", "%d-%m-%y", "%d/%m/%y", "%m/%d/%Y", "%m-%d-%Y",
];

/// Result of cleaning a batch of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedRows {
    /// Rows kept, in input order
    pub rows: Vec<RawRecord>,

    /// Rows dropped because every cell was empty
    pub dropped_empty: usize,

    /// Entries dropped because they were not JSON objects
    pub dropped_invalid: usize,
}

/// Parse a date in any accepted format and render it as `DD-MM-YYYY`.
///
/// Anything after the first space (a time of day) is ignored.
#[must_use]
pub fn standardize_date(raw: &str) -> Option<String> {
    let date_part = raw.trim().split(' ').next().unwrap_or_default();
    if date_part.is_empty() {
        return None;
    }

    DATE_INPUT_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(date_part, format)
            .ok()
            // `%Y` must be a four-digit year
            .filter(|date| !format.contains("%Y") || date.year() >= 1000)
            .map(|date| date.format(DATE_OUTPUT_FORMAT).to_string())
    })
}

/// Render a cell as trimmed text; `None` for null or blank cells.
fn clean_cell(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        // Spreadsheet exports store whole numbers as floats
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Clean a single row. Returns `None` if every cell is empty.
#[must_use]
pub fn clean_row(row: &Map<String, Value>) -> Option<RawRecord> {
    let mut cleaned = Map::with_capacity(row.len());
    let mut has_content = false;

    for (column, value) in row {
        let mut cell = clean_cell(value);
        has_content |= cell.is_some();

        if column == DATE_OF_BIRTH_COLUMN {
            cell = cell.as_deref().and_then(standardize_date);
        }
        cleaned.insert(column.clone(), cell.map_or(Value::Null, Value::String));
    }

    has_content.then_some(Value::Object(cleaned))
}

/// Clean a batch of exported rows.
#[must_use]
pub fn clean_rows(rows: &[Value]) -> CleanedRows {
    let mut result = CleanedRows::default();

    for (index, row) in rows.iter().enumerate() {
        let Some(map) = row.as_object() else {
            tracing::warn!("Row {} is not an object, skipping", index);
            result.dropped_invalid += 1;
            continue;
        };
        match clean_row(map) {
            Some(cleaned) => result.rows.push(cleaned),
            None => result.dropped_empty += 1,
        }
    }

    tracing::debug!(
        "Cleaned {} rows ({} empty, {} invalid)",
        result.rows.len(),
        result.dropped_empty,
        result.dropped_invalid
    );
    result
}
