//! Records → sheet, through a buffered stream writer
//!
//! A write session opens a stream and replays the sheet's existing rows into
//! it, since flushing a stream replaces the sheet's previous contents. New
//! rows are then assembled from the field map and written at an advancing
//! row cursor.

use crate::cell_ref::coordinates_to_cell_name;
use crate::engine::{RowStream, Spreadsheet};
use crate::error::{SheetMapError, SheetMapResult};
use crate::mapping::FieldMap;
use crate::types::DataRecord;
use tracing::{debug, info};

/// Open a stream for `sheet` with every existing row already replayed into it
pub fn open_session<S: Spreadsheet>(book: &S, sheet: &str) -> SheetMapResult<S::Stream> {
    let mut stream = book.new_stream_writer(sheet)?;
    let rows = book.row_values(sheet)?;

    let mut replayed = 0usize;
    for (idx, row) in rows.into_iter().enumerate() {
        let begin = coordinates_to_cell_name(1, idx as u32 + 1)?;
        stream.set_row(&begin, row)?;
        replayed += 1;
    }

    info!(sheet, rows = replayed, "opened write session");
    Ok(stream)
}

/// Write `records` into an open stream starting at `row_number`
///
/// Each record becomes one row addressed at the map's leftmost column.
/// Returns the next unused row number.
pub fn write_to_stream<W: RowStream + ?Sized>(
    stream: &mut W,
    row_number: u32,
    field_map: &FieldMap,
    records: &[DataRecord],
) -> SheetMapResult<u32> {
    let Some(min_column) = field_map.min_column() else {
        return Ok(row_number);
    };

    let mut row_cursor = row_number;
    for record in records {
        let row = field_map.build_row(record)?;
        let cell = coordinates_to_cell_name(min_column, row_cursor)?;
        stream.set_row(&cell, row)?;
        row_cursor += 1;
    }

    debug!(
        sheet = stream.sheet(),
        first_row = row_number,
        rows = records.len(),
        "wrote rows to stream"
    );
    Ok(row_cursor)
}

/// Open a session, write all `records` from `row_number`, then flush
///
/// The workbook is not saved; the caller decides when to persist. Returns the
/// next unused row number.
pub fn write_records<S: Spreadsheet>(
    book: &mut S,
    sheet: &str,
    row_number: u32,
    field_map: &FieldMap,
    records: &[DataRecord],
) -> SheetMapResult<u32> {
    let mut stream = open_session(book, sheet)?;
    let next_row = write_to_stream(&mut stream, row_number, field_map, records)?;
    book.flush_stream(stream)?;
    Ok(next_row)
}

/// Next writable row: number of existing rows + 1
pub fn next_row_number<S: Spreadsheet>(book: &S, sheet: &str) -> SheetMapResult<u32> {
    let rows = book.rows(sheet)?;
    Ok(rows.len() as u32 + 1)
}

/// Delete a 1-based row from the sheet, shifting later rows up
pub fn remove_row<S: Spreadsheet>(book: &mut S, sheet: &str, row: u32) -> SheetMapResult<()> {
    if row == 0 {
        return Err(SheetMapError::AddressParse(format!("row {}", row)));
    }
    book.remove_row(sheet, row)
}
