//! Sheet → records
//!
//! Optionally flattens merged regions first, then turns each row at or
//! below the start row into a field-name → text record.

use crate::cell_ref::{column_number_to_name, expand_cell_region};
use crate::config::ReadOptions;
use crate::engine::Spreadsheet;
use crate::error::{SheetMapError, SheetMapResult};
use crate::types::{ColumnMap, Record};
use tracing::{debug, info};

/// Replace every merged region with its value repeated in each covered cell
///
/// The region value is captured before un-merging. The first failure aborts
/// the whole pass; the sheet must then be treated as not normalized.
pub fn unmerge_cells<S: Spreadsheet>(book: &mut S, sheet: &str) -> SheetMapResult<usize> {
    let regions = book.merged_regions(sheet).map_err(|e| match e {
        SheetMapError::MergeRead(_) => e,
        other => SheetMapError::MergeRead(other.to_string()),
    })?;
    if regions.is_empty() {
        return Ok(0);
    }

    for region in &regions {
        book.unmerge_cell(sheet, &region.start, &region.end)
            .map_err(|e| SheetMapError::MergeWrite(format!("{}: {}", region.range_ref(), e)))?;

        for cell in expand_cell_region(&region.start, &region.end)? {
            book.set_cell_value(sheet, &cell, region.value.clone())
                .map_err(|e| SheetMapError::MergeWrite(format!("{}: {}", cell, e)))?;
        }
        debug!(sheet, region = %region.range_ref(), "unmerged region");
    }

    info!(sheet, regions = regions.len(), "normalized merged cells");
    Ok(regions.len())
}

/// Read the sheet's rows into records
///
/// Without a column map, fields are named by column letter ("A", "B", ...).
/// With one, only mapped columns are kept. Rows above `start_row` are skipped;
/// a sheet with nothing below the start row yields no records.
pub fn read_records<S: Spreadsheet>(
    book: &mut S,
    sheet: &str,
    options: &ReadOptions,
) -> SheetMapResult<Vec<Record>> {
    if options.unmerge {
        unmerge_cells(book, sheet)?;
    }

    let rows = book.rows(sheet)?;
    let skip = options.start_row.saturating_sub(1) as usize;

    let records = rows
        .into_iter()
        .skip(skip)
        .map(|row| row_to_record(row, options.column_map.as_ref()))
        .collect::<SheetMapResult<Vec<_>>>()?;

    debug!(sheet, records = records.len(), start_row = options.start_row, "read records");
    Ok(records)
}

fn row_to_record(row: Vec<String>, column_map: Option<&ColumnMap>) -> SheetMapResult<Record> {
    let mut record = Record::with_capacity(row.len());
    for (idx, cell) in row.into_iter().enumerate() {
        let column = column_number_to_name(idx as u32 + 1)?;
        match column_map {
            Some(map) => {
                if let Some(field) = map.get(&column) {
                    record.insert(field.clone(), cell);
                }
            }
            None => {
                record.insert(column, cell);
            }
        }
    }
    Ok(record)
}
