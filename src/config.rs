//! Read/write options and column-map loading

use crate::cell_ref::column_name_to_number;
use crate::error::{SheetMapError, SheetMapResult};
use crate::types::ColumnMap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Default capacity of the batch channel feeding the pipeline
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Options for reading records out of a sheet
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// 1-based first row to turn into a record
    pub start_row: u32,
    /// Flatten merged regions before reading
    pub unmerge: bool,
    /// Column letter → field name; `None` keys records by column letter
    pub column_map: Option<ColumnMap>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            start_row: 1,
            unmerge: false,
            column_map: None,
        }
    }
}

impl ReadOptions {
    pub fn with_start_row(mut self, start_row: u32) -> Self {
        self.start_row = start_row;
        self
    }

    pub fn with_unmerge(mut self, unmerge: bool) -> Self {
        self.unmerge = unmerge;
        self
    }

    pub fn with_column_map(mut self, column_map: ColumnMap) -> Self {
        self.column_map = Some(column_map);
        self
    }
}

/// Streaming pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Batches the channel holds before producers wait
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Load a column map from a YAML (or JSON) file of `LETTER: field` pairs
///
/// Column letters are upper-cased; anything that is not a valid column is
/// rejected.
pub fn load_column_map(path: &Path) -> SheetMapResult<ColumnMap> {
    let content = fs::read_to_string(path)?;
    parse_column_map(&content)
}

/// Parse a column map from YAML text (JSON is valid YAML)
pub fn parse_column_map(content: &str) -> SheetMapResult<ColumnMap> {
    let raw: HashMap<String, String> = serde_yaml::from_str(content)?;
    raw.into_iter()
        .map(|(column, field)| {
            let column = column.trim().to_ascii_uppercase();
            column_name_to_number(&column).map_err(|_| {
                SheetMapError::ColumnAddress(format!(
                    "'{}' in column map is not a column letter",
                    column
                ))
            })?;
            Ok((column, field))
        })
        .collect()
}
