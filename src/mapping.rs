//! Header-row field mapping
//!
//! The first row of a target sheet describes how each column is filled:
//! plain text names a record field, text containing `{{` is a template
//! evaluated against the whole record.

use crate::engine::Spreadsheet;
use crate::error::{SheetMapError, SheetMapResult};
use crate::template::{is_template, FunctionTable, Template};
use crate::types::{CellValue, DataRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// How a template column's output is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Rendered text is stored as a string
    ComputedString,
    /// Header starts with '='; rendered text is stored as a formula
    Formula,
}

/// Value producer for one column
#[derive(Debug, Clone)]
pub enum FieldEntry {
    /// Header text used as the record key (and as the fallback value)
    Literal(String),
    Template { template: Template, kind: CellKind },
}

impl FieldEntry {
    /// Build the entry for one header cell
    pub fn compile(
        column: u32,
        header: &str,
        functions: &FunctionTable,
    ) -> SheetMapResult<Self> {
        if !is_template(header) {
            return Ok(FieldEntry::Literal(header.to_string()));
        }

        let name = format!("field_{}_tpl", column);
        let template = Template::compile(name, header, functions).map_err(|e| {
            SheetMapError::TemplateCompile {
                column,
                message: e.to_string(),
            }
        })?;
        let kind = if header.starts_with('=') {
            CellKind::Formula
        } else {
            CellKind::ComputedString
        };
        Ok(FieldEntry::Template { template, kind })
    }

    pub fn is_template(&self) -> bool {
        matches!(self, FieldEntry::Template { .. })
    }

    /// Produce this column's cell for `record`
    ///
    /// A literal whose field is absent from the record resolves to the header
    /// text itself, so a missing field never shifts or blanks the column.
    pub fn resolve(&self, record: &DataRecord) -> SheetMapResult<CellValue> {
        match self {
            FieldEntry::Literal(key) => Ok(match record.get(key) {
                Some(value) => CellValue::from_json(value),
                None => CellValue::Text(key.clone()),
            }),
            FieldEntry::Template { template, kind } => {
                let rendered = template
                    .execute(record)
                    .map_err(|e| SheetMapError::TemplateExecution(e.to_string()))?;
                Ok(match kind {
                    CellKind::ComputedString => CellValue::Text(rendered),
                    CellKind::Formula => {
                        let body = rendered.strip_prefix('=').unwrap_or(&rendered);
                        CellValue::formula(body)
                    }
                })
            }
        }
    }
}

/// Column index (1-based) → value producer, iterated in column order
///
/// Built once per write session and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: BTreeMap<u32, FieldEntry>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every header cell of `header`; column i of the slice is column i+1
    pub fn from_header(header: &[String], functions: &FunctionTable) -> SheetMapResult<Self> {
        let mut entries = BTreeMap::new();
        for (idx, text) in header.iter().enumerate() {
            let column = idx as u32 + 1;
            entries.insert(column, FieldEntry::compile(column, text, functions)?);
        }
        Ok(Self { entries })
    }

    pub fn insert(&mut self, column: u32, entry: FieldEntry) -> Option<FieldEntry> {
        self.entries.insert(column, entry)
    }

    pub fn get(&self, column: u32) -> Option<&FieldEntry> {
        self.entries.get(&column)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Leftmost mapped column
    pub fn min_column(&self) -> Option<u32> {
        self.entries.keys().next().copied()
    }

    /// Rightmost mapped column
    pub fn max_column(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &FieldEntry)> {
        self.entries.iter().map(|(column, entry)| (*column, entry))
    }

    /// One output row for `record`, spanning min_column..=max_column
    ///
    /// Columns inside the span without an entry are left empty.
    pub fn build_row(&self, record: &DataRecord) -> SheetMapResult<Vec<CellValue>> {
        let (Some(min), Some(max)) = (self.min_column(), self.max_column()) else {
            return Ok(Vec::new());
        };

        let mut row = vec![CellValue::Empty; (max - min + 1) as usize];
        for (column, entry) in self.iter() {
            row[(column - min) as usize] = entry.resolve(record)?;
        }
        Ok(row)
    }
}

/// Compile the header row of `sheet` into a field map
///
/// The sheet needs the header plus at least one more row.
pub fn compile_field_map<S: Spreadsheet>(
    book: &S,
    sheet: &str,
    functions: &FunctionTable,
) -> SheetMapResult<FieldMap> {
    let rows = book.rows(sheet)?;
    if rows.len() < 2 {
        return Err(SheetMapError::InsufficientRows {
            sheet: sheet.to_string(),
            found: rows.len(),
        });
    }

    let map = FieldMap::from_header(&rows[0], functions)?;
    debug!(
        sheet,
        columns = map.len(),
        templates = map.iter().filter(|(_, e)| e.is_template()).count(),
        "compiled field map"
    );
    Ok(map)
}

/// Resolve one entry against one record
pub fn resolve_value(entry: &FieldEntry, record: &DataRecord) -> SheetMapResult<CellValue> {
    entry.resolve(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::XlsxWorkbook;
    use serde_json::json;

    fn record(value: serde_json::Value) -> DataRecord {
        value.as_object().cloned().unwrap_or_default()
    }

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_literal_and_template_entries() {
        let map = FieldMap::from_header(
            &header(&["id", "{{.amount | fen2yuan}}", "=SUM({{.a}})", ""]),
            &FunctionTable::builtin(),
        )
        .unwrap();

        assert_eq!(map.len(), 4);
        assert!(matches!(map.get(1), Some(FieldEntry::Literal(s)) if s == "id"));
        assert!(matches!(
            map.get(2),
            Some(FieldEntry::Template { kind: CellKind::ComputedString, .. })
        ));
        assert!(matches!(
            map.get(3),
            Some(FieldEntry::Template { kind: CellKind::Formula, .. })
        ));
        assert!(matches!(map.get(4), Some(FieldEntry::Literal(s)) if s.is_empty()));
    }

    #[test]
    fn test_compile_error_names_column() {
        let err = FieldMap::from_header(
            &header(&["id", "ok", "{{.x | missing_fn}}"]),
            &FunctionTable::builtin(),
        )
        .unwrap_err();
        assert!(matches!(err, SheetMapError::TemplateCompile { column: 3, .. }));
    }

    #[test]
    fn test_literal_resolves_record_value() {
        let entry = FieldEntry::Literal("Name".to_string());
        let value = resolve_value(&entry, &record(json!({"Name": "Ada"}))).unwrap();
        assert_eq!(value, CellValue::Text("Ada".to_string()));

        let value = resolve_value(&entry, &record(json!({"Name": 7}))).unwrap();
        assert_eq!(value, CellValue::Int(7));
    }

    #[test]
    fn test_literal_falls_back_to_header_text() {
        let entry = FieldEntry::Literal("Name".to_string());
        let value = resolve_value(&entry, &record(json!({"Other": "x"}))).unwrap();
        assert_eq!(value, CellValue::Text("Name".to_string()));
    }

    #[test]
    fn test_formula_entry_resolves_to_formula() {
        let entry = FieldEntry::compile(3, "=B{{.row}}*2", &FunctionTable::builtin()).unwrap();
        let value = entry.resolve(&record(json!({"row": 5}))).unwrap();
        assert_eq!(value, CellValue::formula("B5*2"));
    }

    #[test]
    fn test_template_execution_error() {
        let entry = FieldEntry::compile(1, "{{.a.b}}", &FunctionTable::builtin()).unwrap();
        let err = entry.resolve(&record(json!({"a": 1}))).unwrap_err();
        assert!(matches!(err, SheetMapError::TemplateExecution(_)));
    }

    #[test]
    fn test_build_row_fills_gaps() {
        let mut map = FieldMap::new();
        map.insert(4, FieldEntry::Literal("b".to_string()));
        map.insert(2, FieldEntry::Literal("a".to_string()));

        let row = map.build_row(&record(json!({"a": 1, "b": "x"}))).unwrap();
        assert_eq!(map.min_column(), Some(2));
        assert_eq!(
            row,
            vec![CellValue::Int(1), CellValue::Empty, CellValue::Text("x".to_string())]
        );
    }

    #[test]
    fn test_compile_field_map_requires_two_rows() {
        let mut book = XlsxWorkbook::new("unused.xlsx");
        book.add_sheet("Sheet1");
        book.set_rows("Sheet1", vec![vec!["id".into()]]).unwrap();

        let err = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap_err();
        assert!(matches!(err, SheetMapError::InsufficientRows { found: 1, .. }));

        book.set_rows("Sheet1", vec![vec!["id".into()], vec!["1".into()]])
            .unwrap();
        let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();
        assert_eq!(map.len(), 1);
    }
}
