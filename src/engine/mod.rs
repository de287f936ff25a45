//! Spreadsheet engine contract
//!
//! Everything in this crate talks to spreadsheets through [`Spreadsheet`] and
//! [`RowStream`]. [`XlsxWorkbook`] is the bundled implementation; any other
//! engine exposing the same operations can be substituted.

mod xlsx;

pub use xlsx::{SheetStream, XlsxWorkbook};

use crate::error::SheetMapResult;
use crate::types::{CellValue, MergedRegion};

/// Buffered, append-oriented row writer over one sheet
///
/// Rows are only committed to the sheet by [`Spreadsheet::flush_stream`].
pub trait RowStream: Send {
    /// Sheet this stream writes to
    fn sheet(&self) -> &str;

    /// Buffer `values` as one row starting at `start_cell` ("B4")
    fn set_row(&mut self, start_cell: &str, values: Vec<CellValue>) -> SheetMapResult<()>;
}

/// Operations the mapping layer needs from a spreadsheet engine
pub trait Spreadsheet: Send {
    type Stream: RowStream;

    /// Names of all sheets in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Every row up to the last non-empty one, as typed values
    ///
    /// Trailing empty cells of each row are dropped; blank rows in the middle
    /// come back as empty vectors.
    fn row_values(&self, sheet: &str) -> SheetMapResult<Vec<Vec<CellValue>>>;

    /// [`Spreadsheet::row_values`] rendered as display strings
    fn rows(&self, sheet: &str) -> SheetMapResult<Vec<Vec<String>>> {
        Ok(self
            .row_values(sheet)?
            .into_iter()
            .map(|row| row.iter().map(CellValue::as_text).collect())
            .collect())
    }

    /// All merged regions of the sheet with the value each one displays
    fn merged_regions(&self, sheet: &str) -> SheetMapResult<Vec<MergedRegion>>;

    /// Remove the merge covering exactly `start:end`
    fn unmerge_cell(&mut self, sheet: &str, start: &str, end: &str) -> SheetMapResult<()>;

    fn set_cell_value(&mut self, sheet: &str, cell: &str, value: CellValue) -> SheetMapResult<()>;

    /// Delete a 1-based row, shifting the rows below it up by one
    fn remove_row(&mut self, sheet: &str, row: u32) -> SheetMapResult<()>;

    /// Open an empty stream writer for the sheet
    fn new_stream_writer(&self, sheet: &str) -> SheetMapResult<Self::Stream>;

    /// Replace the sheet's cell data with everything buffered in `stream`
    fn flush_stream(&mut self, stream: Self::Stream) -> SheetMapResult<()>;

    /// Persist the workbook to its backing file
    fn save(&mut self) -> SheetMapResult<()>;
}
