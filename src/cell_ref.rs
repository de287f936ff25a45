//! Cell address conversions and merged-region expansion
//!
//! Columns and rows are 1-based, matching the labels users see ("B3" is
//! column 2, row 3).

use crate::error::{SheetMapError, SheetMapResult};
use std::fmt;
use std::str::FromStr;

/// Largest column an xlsx sheet can hold (XFD)
pub const MAX_COLUMNS: u32 = 16_384;
/// Largest row an xlsx sheet can hold
pub const MAX_ROWS: u32 = 1_048_576;

/// A 1-based (column, row) coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub column: u32,
    pub row: u32,
}

impl CellAddress {
    /// Build an address, rejecting coordinates outside the sheet bounds
    pub fn new(column: u32, row: u32) -> SheetMapResult<Self> {
        if column == 0 || column > MAX_COLUMNS {
            return Err(SheetMapError::ColumnAddress(format!(
                "column number {} is out of range 1..={}",
                column, MAX_COLUMNS
            )));
        }
        if row == 0 || row > MAX_ROWS {
            return Err(SheetMapError::AddressParse(format!("row {}", row)));
        }
        Ok(Self { column, row })
    }

    /// Parse a label like "B3", "ab12" or "$C$7"
    pub fn parse(label: &str) -> SheetMapResult<Self> {
        let invalid = || SheetMapError::AddressParse(label.to_string());
        let cleaned: String = label.trim().chars().filter(|c| *c != '$').collect();

        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (letters, digits) = cleaned.split_at(split);
        if letters.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let column = column_name_to_number(letters).map_err(|_| invalid())?;
        let row: u32 = digits.parse().map_err(|_| invalid())?;
        if row == 0 || row > MAX_ROWS {
            return Err(invalid());
        }
        Ok(Self { column, row })
    }

    /// Render the address as a label ("B3")
    pub fn label(&self) -> SheetMapResult<String> {
        Ok(format!("{}{}", column_number_to_name(self.column)?, self.row))
    }

    /// Zero-based (row, column) pair as used by calamine and rust_xlsxwriter
    pub fn zero_based(&self) -> (u32, u16) {
        (self.row - 1, (self.column - 1) as u16)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match column_number_to_name(self.column) {
            Ok(name) => write!(f, "{}{}", name, self.row),
            Err(_) => write!(f, "R{}C{}", self.row, self.column),
        }
    }
}

impl FromStr for CellAddress {
    type Err = SheetMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Convert a 1-based column number to its letters
///
/// Examples:
/// - 1 → A
/// - 26 → Z
/// - 27 → AA
/// - 16384 → XFD
pub fn column_number_to_name(column: u32) -> SheetMapResult<String> {
    if column == 0 || column > MAX_COLUMNS {
        return Err(SheetMapError::ColumnAddress(format!(
            "column number {} is out of range 1..={}",
            column, MAX_COLUMNS
        )));
    }

    let mut result = String::new();
    let mut idx = column;
    while idx > 0 {
        let remainder = (idx - 1) % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        idx = (idx - 1) / 26;
    }
    Ok(result)
}

/// Convert column letters ("A", "ab") to a 1-based column number
pub fn column_name_to_number(name: &str) -> SheetMapResult<u32> {
    if name.is_empty() || name.len() > 3 {
        return Err(SheetMapError::ColumnAddress(format!(
            "invalid column name '{}'",
            name
        )));
    }

    let mut column: u32 = 0;
    for ch in name.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(SheetMapError::ColumnAddress(format!(
                "invalid column name '{}'",
                name
            )));
        }
        let upper = ch.to_ascii_uppercase();
        column = column * 26 + (upper as u32 - 'A' as u32 + 1);
    }

    if column > MAX_COLUMNS {
        return Err(SheetMapError::ColumnAddress(format!(
            "column '{}' is beyond the last column XFD",
            name
        )));
    }
    Ok(column)
}

/// Label for a 1-based (column, row) pair
pub fn coordinates_to_cell_name(column: u32, row: u32) -> SheetMapResult<String> {
    CellAddress::new(column, row)?.label()
}

/// Expand the inclusive rectangle `start:end` into every cell label it covers
///
/// Cells are returned row by row, left to right. Corners may be given in any
/// order; the rectangle is normalized first.
pub fn expand_cell_region(start: &str, end: &str) -> SheetMapResult<Vec<String>> {
    let first = CellAddress::parse(start)?;
    let last = CellAddress::parse(end)?;

    let (top, bottom) = (first.row.min(last.row), first.row.max(last.row));
    let (left, right) = (first.column.min(last.column), first.column.max(last.column));

    let capacity = ((bottom - top + 1) as usize) * ((right - left + 1) as usize);
    let mut cells = Vec::with_capacity(capacity);
    for row in top..=bottom {
        for column in left..=right {
            cells.push(coordinates_to_cell_name(column, row)?);
        }
    }
    Ok(cells)
}
