use crate::cell_ref::MAX_ROWS;
use crate::config::{load_column_map, PipelineConfig, ReadOptions};
use crate::engine::{Spreadsheet, XlsxWorkbook};
use crate::error::{SheetMapError, SheetMapResult};
use crate::mapping::compile_field_map;
use crate::pipeline::start_pipeline;
use crate::reader::{read_records, unmerge_cells};
use crate::template::FunctionTable;
use crate::types::{DataBatch, DataRecord, Record};
use crate::writer::{next_row_number, remove_row};
use colored::Colorize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Row holding the sample data under the header in template workbooks
const SAMPLE_ROW: u32 = 2;

/// Execute the read command
///
/// Without `output` the records go to stdout as JSON and nothing else is
/// printed there, so the result can be piped.
pub fn read(
    file: PathBuf,
    sheet: String,
    start_row: u32,
    unmerge: bool,
    map: Option<PathBuf>,
    output: Option<PathBuf>,
) -> SheetMapResult<()> {
    let mut options = ReadOptions::default()
        .with_start_row(start_row)
        .with_unmerge(unmerge);
    if let Some(map_path) = &map {
        options = options.with_column_map(load_column_map(map_path)?);
    }

    let mut book = XlsxWorkbook::open(&file)?;
    let records = read_records(&mut book, &sheet, &options)?;
    let json = records_to_json(&records)?;

    match output {
        None => println!("{json}"),
        Some(output) => {
            println!("{}", "📖 Sheetmap - Read".bold().green());
            println!("   File:  {}", file.display());
            println!("   Sheet: {}", sheet.bright_blue().bold());
            if let Some(map_path) = &map {
                println!("   Map:   {}", map_path.display());
            }
            println!();

            fs::write(&output, json + "\n")?;
            println!(
                "{}",
                format!("✅ {} records written to {}", records.len(), output.display())
                    .bold()
                    .green()
            );
        }
    }
    Ok(())
}

/// Execute the write command
pub async fn write(
    file: PathBuf,
    sheet: String,
    input: PathBuf,
    start_row: Option<u32>,
    batch_size: usize,
    drop_sample_row: bool,
) -> SheetMapResult<()> {
    println!("{}", "📝 Sheetmap - Write".bold().green());
    println!("   File:  {}", file.display());
    println!("   Sheet: {}", sheet.bright_blue().bold());
    println!("   Input: {}\n", input.display());

    let records = load_records(&input)?;
    let mut book = XlsxWorkbook::open(&file)?;
    let field_map = compile_field_map(&book, &sheet, &FunctionTable::builtin())?;
    println!(
        "   Header: {} columns, {} templates",
        field_map.len(),
        field_map.iter().filter(|(_, e)| e.is_template()).count()
    );

    if drop_sample_row {
        remove_row(&mut book, &sheet, SAMPLE_ROW)?;
        println!("   Dropped sample row {}", SAMPLE_ROW);
    }

    let first_row = match start_row {
        Some(row) => row,
        None => next_row_number(&book, &sheet)?,
    };
    // Every record needs a row inside the sheet
    let end_row = u64::from(first_row) + records.len() as u64;
    if first_row == 0 || end_row > u64::from(MAX_ROWS) + 1 {
        return Err(SheetMapError::AddressParse(format!(
            "{} records from row {} exceed the sheet's {} rows",
            records.len(),
            first_row,
            MAX_ROWS
        )));
    }
    println!("   Writing {} records from row {}\n", records.len(), first_row);

    let (sender, handle) = start_pipeline(
        book,
        &sheet,
        Arc::new(field_map),
        &PipelineConfig::default(),
    )?;

    let mut row = first_row;
    for chunk in records.chunks(batch_size.max(1)) {
        let batch = DataBatch::new(chunk.to_vec(), row);
        // A closed channel means the writer stopped; its error is in the completion
        if sender.send(batch).await.is_err() {
            break;
        }
        row += chunk.len() as u32;
    }
    drop(sender);

    let completion = handle.wait().await?;
    if let Some(e) = completion.error {
        println!("{}", "❌ Write failed - file not saved".bold().red());
        println!("   {}", e.to_string().red());
        return Err(e);
    }

    println!("{}", "✅ Write Complete!".bold().green());
    println!(
        "   {} batches, {} rows, next row {}",
        completion.batches,
        completion.rows_written,
        completion.next_row.unwrap_or(first_row)
    );
    println!("   Saved: {}\n", file.display());
    Ok(())
}

/// Execute the unmerge command
pub fn unmerge(file: PathBuf, sheet: String) -> SheetMapResult<()> {
    println!("{}", "🧩 Sheetmap - Unmerge".bold().green());
    println!("   File:  {}", file.display());
    println!("   Sheet: {}\n", sheet.bright_blue().bold());

    let mut book = XlsxWorkbook::open(&file)?;
    let regions = unmerge_cells(&mut book, &sheet)?;
    if regions == 0 {
        println!("{}", "   No merged regions found".yellow());
        return Ok(());
    }

    book.save()?;
    println!(
        "{}",
        format!("✅ Normalized {} merged regions", regions)
            .bold()
            .green()
    );
    Ok(())
}

/// Load a JSON array of objects
fn load_records(path: &Path) -> SheetMapResult<Vec<DataRecord>> {
    let content = fs::read_to_string(path)?;
    let records: Vec<DataRecord> = serde_json::from_str(&content)?;
    Ok(records)
}

/// Pretty JSON with keys sorted, for stable output
fn records_to_json(records: &[Record]) -> SheetMapResult<String> {
    let sorted: Vec<BTreeMap<&str, &str>> = records
        .iter()
        .map(|r| r.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
        .collect();
    serde_json::to_string_pretty(&sorted).map_err(SheetMapError::from)
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
