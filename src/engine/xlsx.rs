//! In-memory workbook backed by an .xlsx file
//!
//! Reads with calamine, writes with rust_xlsxwriter. Cell data lives in a
//! sparse map between the two so that merged cells, row removal and stream
//! flushes can be applied before the file is saved.

use super::{RowStream, Spreadsheet};
use crate::cell_ref::{CellAddress, MAX_COLUMNS};
use crate::error::{SheetMapError, SheetMapResult};
use crate::types::{CellValue, MergedRegion};
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Formula};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Number formats used when saving date cells
const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// One inclusive rectangle of merged cells
#[derive(Debug, Clone, Copy, PartialEq)]
struct Merge {
    first: CellAddress,
    last: CellAddress,
}

#[derive(Debug, Clone, Default)]
struct SheetData {
    name: String,
    /// Keyed by 1-based (row, column)
    cells: BTreeMap<(u32, u32), CellValue>,
    merges: Vec<Merge>,
}

impl SheetData {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn set(&mut self, row: u32, column: u32, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&(row, column));
        } else {
            self.cells.insert((row, column), value);
        }
    }
}

/// Workbook held in memory and saved back to `path`
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    path: PathBuf,
    sheets: Vec<SheetData>,
}

impl XlsxWorkbook {
    /// Create an empty workbook that will be saved to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheets: Vec::new(),
        }
    }

    /// Open an existing .xlsx file, loading values, formulas and merged regions
    pub fn open<P: AsRef<Path>>(path: P) -> SheetMapResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut workbook: Xlsx<_> = open_workbook(&path).map_err(|e| {
            SheetMapError::Workbook(format!("Failed to open {}: {}", path.display(), e))
        })?;
        workbook
            .load_merged_regions()
            .map_err(|e| SheetMapError::MergeRead(e.to_string()))?;

        let mut book = Self::new(&path);
        for name in workbook.sheet_names().to_vec() {
            let mut sheet = SheetData::new(&name);

            let range = workbook.worksheet_range(&name).map_err(|e| {
                SheetMapError::Workbook(format!("Failed to read sheet '{}': {}", name, e))
            })?;
            if let Some((row0, col0)) = range.start() {
                for (r, c, data) in range.used_cells() {
                    let value = Self::convert_data(data);
                    sheet.set(row0 + r as u32 + 1, col0 + c as u32 + 1, value);
                }
            }

            // Formula cells keep the value loaded above as their cached result
            if let Ok(formulas) = workbook.worksheet_formula(&name) {
                if let Some((row0, col0)) = formulas.start() {
                    for (r, c, formula) in formulas.used_cells() {
                        if formula.is_empty() {
                            continue;
                        }
                        let key = (row0 + r as u32 + 1, col0 + c as u32 + 1);
                        let result = sheet.cells.remove(&key).unwrap_or_default();
                        sheet.cells.insert(
                            key,
                            CellValue::Formula {
                                formula: formula.strip_prefix('=').unwrap_or(formula).to_string(),
                                result: Box::new(result),
                            },
                        );
                    }
                }
            }

            for (_, _, dims) in workbook.merged_regions_by_sheet(&name) {
                sheet.merges.push(Merge {
                    first: CellAddress::new(dims.start.1 + 1, dims.start.0 + 1)?,
                    last: CellAddress::new(dims.end.1 + 1, dims.end.0 + 1)?,
                });
            }

            debug!(
                sheet = %name,
                cells = sheet.cells.len(),
                merges = sheet.merges.len(),
                "loaded sheet"
            );
            book.sheets.push(sheet);
        }

        info!(path = %path.display(), sheets = book.sheets.len(), "opened workbook");
        Ok(book)
    }

    fn convert_data(data: &Data) -> CellValue {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Int(*i),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
            // ISO date strings and error values have no typed counterpart
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add an empty sheet; adding an existing name is a no-op
    pub fn add_sheet(&mut self, name: &str) {
        if self.sheet(name).is_err() {
            self.sheets.push(SheetData::new(name));
        }
    }

    /// Overwrite the sheet with `rows`, starting at A1
    pub fn set_rows(&mut self, name: &str, rows: Vec<Vec<CellValue>>) -> SheetMapResult<()> {
        let sheet = self.sheet_mut(name)?;
        sheet.cells.clear();
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                sheet.set(r as u32 + 1, c as u32 + 1, value);
            }
        }
        Ok(())
    }

    /// Value of a single cell, `Empty` when unset
    pub fn cell_value(&self, sheet: &str, cell: &str) -> SheetMapResult<CellValue> {
        let addr = CellAddress::parse(cell)?;
        Ok(self
            .sheet(sheet)?
            .cells
            .get(&(addr.row, addr.column))
            .cloned()
            .unwrap_or_default())
    }

    /// Merge the rectangle `start:end`
    pub fn merge_cells(&mut self, sheet: &str, start: &str, end: &str) -> SheetMapResult<()> {
        let first = CellAddress::parse(start)?;
        let last = CellAddress::parse(end)?;
        if first.column > last.column || first.row > last.row {
            return Err(SheetMapError::MergeWrite(format!(
                "merge range {}:{} is inverted",
                start, end
            )));
        }
        self.sheet_mut(sheet)?.merges.push(Merge { first, last });
        Ok(())
    }

    /// Save to a different path; later saves keep using the new path
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> SheetMapResult<()> {
        self.path = path.as_ref().to_path_buf();
        self.save()
    }

    fn sheet(&self, name: &str) -> SheetMapResult<&SheetData> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SheetMapError::SheetNotFound(name.to_string()))
    }

    fn sheet_mut(&mut self, name: &str) -> SheetMapResult<&mut SheetData> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| SheetMapError::SheetNotFound(name.to_string()))
    }

    fn write_sheet(
        worksheet: &mut rust_xlsxwriter::Worksheet,
        sheet: &SheetData,
    ) -> Result<(), rust_xlsxwriter::XlsxError> {
        worksheet.set_name(&sheet.name)?;

        let merge_format = Format::new();
        let date_format = Format::new().set_num_format(DATE_FORMAT);
        let datetime_format = Format::new().set_num_format(DATETIME_FORMAT);
        for merge in &sheet.merges {
            if merge.first == merge.last {
                continue;
            }
            let (first_row, first_col) = merge.first.zero_based();
            let (last_row, last_col) = merge.last.zero_based();
            worksheet.merge_range(first_row, first_col, last_row, last_col, "", &merge_format)?;
        }

        for (&(row, column), value) in &sheet.cells {
            let (row, col) = (row - 1, (column - 1) as u16);
            match value {
                CellValue::Empty => {}
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                CellValue::Int(i) => {
                    worksheet.write_number(row, col, *i as f64)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
                CellValue::DateTime(serial) => {
                    let format = if serial.fract() == 0.0 {
                        &date_format
                    } else {
                        &datetime_format
                    };
                    worksheet.write_number_with_format(row, col, *serial, format)?;
                }
                CellValue::Formula { formula, result } => {
                    let mut formula = Formula::new(formula);
                    if !result.is_empty() {
                        formula = formula.set_result(result.as_text());
                    }
                    worksheet.write_formula(row, col, formula)?;
                }
            }
        }
        Ok(())
    }
}

impl Spreadsheet for XlsxWorkbook {
    type Stream = SheetStream;

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn row_values(&self, sheet: &str) -> SheetMapResult<Vec<Vec<CellValue>>> {
        let sheet = self.sheet(sheet)?;
        let last_row = sheet.cells.keys().map(|&(row, _)| row).max().unwrap_or(0);

        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); last_row as usize];
        for (&(row, column), value) in &sheet.cells {
            let cells = &mut rows[(row - 1) as usize];
            let idx = (column - 1) as usize;
            if cells.len() <= idx {
                cells.resize(idx + 1, CellValue::Empty);
            }
            cells[idx] = value.clone();
        }
        Ok(rows)
    }

    fn merged_regions(&self, sheet: &str) -> SheetMapResult<Vec<MergedRegion>> {
        let data = self
            .sheet(sheet)
            .map_err(|e| SheetMapError::MergeRead(e.to_string()))?;

        data.merges
            .iter()
            .map(|merge| {
                let value = data
                    .cells
                    .get(&(merge.first.row, merge.first.column))
                    .map(CellValue::displayed)
                    .unwrap_or_default();
                Ok(MergedRegion::new(merge.first.label()?, merge.last.label()?, value))
            })
            .collect()
    }

    fn unmerge_cell(&mut self, sheet: &str, start: &str, end: &str) -> SheetMapResult<()> {
        let a = CellAddress::parse(start)?;
        let b = CellAddress::parse(end)?;
        let target = Merge {
            first: CellAddress {
                column: a.column.min(b.column),
                row: a.row.min(b.row),
            },
            last: CellAddress {
                column: a.column.max(b.column),
                row: a.row.max(b.row),
            },
        };
        self.sheet_mut(sheet)?.merges.retain(|m| *m != target);
        Ok(())
    }

    fn set_cell_value(&mut self, sheet: &str, cell: &str, value: CellValue) -> SheetMapResult<()> {
        let addr = CellAddress::parse(cell)?;
        self.sheet_mut(sheet)?.set(addr.row, addr.column, value);
        Ok(())
    }

    fn remove_row(&mut self, sheet: &str, row: u32) -> SheetMapResult<()> {
        if row == 0 {
            return Err(SheetMapError::AddressParse(format!("row {}", row)));
        }
        let data = self.sheet_mut(sheet)?;

        let cells = std::mem::take(&mut data.cells);
        data.cells = cells
            .into_iter()
            .filter(|((r, _), _)| *r != row)
            .map(|((r, c), v)| if r > row { ((r - 1, c), v) } else { ((r, c), v) })
            .collect();

        data.merges.retain(|m| !(m.first.row == row && m.last.row == row));
        for merge in &mut data.merges {
            if merge.first.row > row {
                merge.first.row -= 1;
            }
            if merge.last.row >= row {
                merge.last.row -= 1;
            }
        }
        Ok(())
    }

    fn new_stream_writer(&self, sheet: &str) -> SheetMapResult<SheetStream> {
        self.sheet(sheet)?;
        Ok(SheetStream {
            sheet: sheet.to_string(),
            rows: BTreeMap::new(),
        })
    }

    fn flush_stream(&mut self, stream: SheetStream) -> SheetMapResult<()> {
        let data = self
            .sheet_mut(&stream.sheet)
            .map_err(|e| SheetMapError::Stream(e.to_string()))?;

        data.cells.clear();
        let mut written = 0usize;
        for (row, (first_column, values)) in stream.rows {
            for (offset, value) in values.into_iter().enumerate() {
                data.set(row, first_column + offset as u32, value);
            }
            written += 1;
        }
        debug!(sheet = %stream.sheet, rows = written, "flushed stream");
        Ok(())
    }

    fn save(&mut self) -> SheetMapResult<()> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            Self::write_sheet(worksheet, sheet).map_err(|e| {
                SheetMapError::Workbook(format!("Failed to write sheet '{}': {}", sheet.name, e))
            })?;
        }

        workbook.save(&self.path).map_err(|e| {
            SheetMapError::Workbook(format!(
                "Failed to save {}: {}",
                self.path.display(),
                e
            ))
        })?;
        info!(path = %self.path.display(), "saved workbook");
        Ok(())
    }
}

/// Row buffer returned by [`XlsxWorkbook::new_stream_writer`]
///
/// Writing the same row twice keeps the later row.
#[derive(Debug)]
pub struct SheetStream {
    sheet: String,
    /// row → (first column, values)
    rows: BTreeMap<u32, (u32, Vec<CellValue>)>,
}

impl SheetStream {
    /// Number of rows currently buffered
    pub fn buffered_rows(&self) -> usize {
        self.rows.len()
    }
}

impl RowStream for SheetStream {
    fn sheet(&self) -> &str {
        &self.sheet
    }

    fn set_row(&mut self, start_cell: &str, values: Vec<CellValue>) -> SheetMapResult<()> {
        let start = CellAddress::parse(start_cell)?;
        let last_column = start.column as usize + values.len().saturating_sub(1);
        if last_column > MAX_COLUMNS as usize {
            return Err(SheetMapError::Stream(format!(
                "row {} starting at {} has {} cells, past the last column",
                start.row,
                start_cell,
                values.len()
            )));
        }
        self.rows.insert(start.row, (start.column, values));
        Ok(())
    }
}
