//! Shared data model: cell values, merged regions, records and batches

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A record produced by the read path: field name → cell text
pub type Record = HashMap<String, String>;

/// A record consumed by the write path: field name → arbitrary scalar
pub type DataRecord = serde_json::Map<String, Value>;

/// Column letter → output field name
pub type ColumnMap = HashMap<String, String>;

/// The value stored in (or written to) a single cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    /// Excel serial date (days since 1899-12-30, fraction = time of day)
    DateTime(f64),
    Formula {
        /// Formula text without the leading '='
        formula: String,
        /// Last computed value stored with the formula, if any
        result: Box<CellValue>,
    },
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Display text of the cell, as a reader would see it
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::DateTime(serial) => format_serial_date(*serial),
            CellValue::Formula { result, .. } => result.as_text(),
        }
    }

    /// A formula cell with no computed result yet
    pub fn formula(formula: impl Into<String>) -> Self {
        CellValue::Formula {
            formula: formula.into(),
            result: Box::new(CellValue::Empty),
        }
    }

    /// Formula text (without '=') when this is a formula cell
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { formula, .. } => Some(formula),
            _ => None,
        }
    }

    /// The value a reader sees: formulas collapse to their cached result
    pub fn displayed(&self) -> CellValue {
        match self {
            CellValue::Formula { result, .. } => result.displayed(),
            other => other.clone(),
        }
    }

    /// Convert a JSON scalar from a data record into a cell value
    ///
    /// Objects and arrays are stored as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int(i),
                None => n.as_f64().map(CellValue::Number).unwrap_or_default(),
            },
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Format a float the way spreadsheets display it: integral values drop the
/// fraction, everything else uses the shortest round-trip form
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Render an Excel serial date as `YYYY-MM-DD`, adding `HH:MM:SS` when
/// there is a time part
pub fn format_serial_date(serial: f64) -> String {
    match serial_to_datetime(serial) {
        Some(dt) if dt.num_seconds_from_midnight() == 0 => dt.format("%Y-%m-%d").to_string(),
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format_number(serial),
    }
}

fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 2958465 is 9999-12-31, the last date Excel displays
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    // Serials below 60 predate the phantom 1900-02-29
    let serial = if serial < 60.0 { serial + 1.0 } else { serial };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// A rectangular span of merged cells and the single value it displays
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRegion {
    /// Top-left cell label ("A1")
    pub start: String,
    /// Bottom-right cell label ("C2")
    pub end: String,
    /// Value of the top-left cell, captured before any un-merge
    pub value: CellValue,
}

impl MergedRegion {
    pub fn new(start: impl Into<String>, end: impl Into<String>, value: CellValue) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            value,
        }
    }

    /// Range reference ("A1:C2")
    pub fn range_ref(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }
}

/// Unit of transfer across the streaming pipeline
#[derive(Debug, Clone, Default)]
pub struct DataBatch {
    pub records: Vec<DataRecord>,
    /// 1-based row the first record of this batch is written to
    pub row_number: u32,
}

impl DataBatch {
    pub fn new(records: Vec<DataRecord>, row_number: u32) -> Self {
        Self {
            records,
            row_number,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_value_text() {
        assert_eq!(CellValue::Empty.as_text(), "");
        assert_eq!(CellValue::Int(42).as_text(), "42");
        assert_eq!(CellValue::Number(3.0).as_text(), "3");
        assert_eq!(CellValue::Number(2.5).as_text(), "2.5");
        assert_eq!(CellValue::Bool(true).as_text(), "TRUE");
    }

    #[test]
    fn test_date_and_formula_text() {
        assert_eq!(CellValue::DateTime(45306.0).as_text(), "2024-01-15");
        assert_eq!(CellValue::DateTime(45306.5).as_text(), "2024-01-15 12:00:00");
        assert_eq!(CellValue::DateTime(1.0).as_text(), "1900-01-01");

        let sum = CellValue::Formula {
            formula: "SUM(A1:A3)".into(),
            result: Box::new(CellValue::Number(6.0)),
        };
        assert_eq!(sum.as_text(), "6");
        assert_eq!(sum.formula_text(), Some("SUM(A1:A3)"));
        assert_eq!(sum.displayed(), CellValue::Number(6.0));
        assert_eq!(CellValue::formula("B1").as_text(), "");
    }

    #[test]
    fn test_cell_value_from_json() {
        assert_eq!(CellValue::from_json(&json!(null)), CellValue::Empty);
        assert_eq!(CellValue::from_json(&json!(500)), CellValue::Int(500));
        assert_eq!(CellValue::from_json(&json!(1.25)), CellValue::Number(1.25));
        assert_eq!(CellValue::from_json(&json!("x")), CellValue::Text("x".into()));
        assert_eq!(CellValue::from_json(&json!(false)), CellValue::Bool(false));
        assert_eq!(
            CellValue::from_json(&json!([1, 2])),
            CellValue::Text("[1,2]".into())
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text(String::new()).is_empty());
        assert!(!CellValue::Int(0).is_empty());
    }

    #[test]
    fn test_merged_region_range_ref() {
        let region = MergedRegion::new("A1", "C2", CellValue::from("Total"));
        assert_eq!(region.range_ref(), "A1:C2");
    }

    #[test]
    fn test_data_batch_len() {
        let batch = DataBatch::new(vec![DataRecord::new(), DataRecord::new()], 5);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.row_number, 5);
    }
}
