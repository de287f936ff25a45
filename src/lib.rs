//! Sheetmap - map spreadsheet rows to records and records back to rows
//!
//! Reading turns each row of a sheet into a field-name → text record, with
//! optional merged-cell flattening and a column → field table. Writing uses
//! the sheet's header row as a template: each header cell is either literal
//! text or a small template evaluated against every data record.
//!
//! # Features
//!
//! - Merged regions flattened into repeated values before reading
//! - Header templates with a pluggable function table (`fen2yuan` built in)
//! - Buffered stream writes that keep the sheet's existing rows
//! - A channel-fed pipeline that writes batches on a dedicated worker and
//!   reports completion exactly once
//!
//! # Example
//!
//! ```no_run
//! use sheetmap::config::ReadOptions;
//! use sheetmap::engine::XlsxWorkbook;
//! use sheetmap::reader::read_records;
//!
//! let mut book = XlsxWorkbook::open("report.xlsx")?;
//! let options = ReadOptions::default().with_start_row(2).with_unmerge(true);
//! let records = read_records(&mut book, "Sheet1", &options)?;
//!
//! println!("Records: {}", records.len());
//! # Ok::<(), sheetmap::error::SheetMapError>(())
//! ```

pub mod cell_ref;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod reader;
pub mod template;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use engine::{RowStream, Spreadsheet, XlsxWorkbook};
pub use error::{SheetMapError, SheetMapResult};
pub use mapping::{CellKind, FieldEntry, FieldMap};
pub use template::FunctionTable;
pub use types::{CellValue, DataBatch, DataRecord, MergedRegion, Record};
