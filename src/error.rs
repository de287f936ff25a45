use thiserror::Error;

pub type SheetMapResult<T> = Result<T, SheetMapError>;

#[derive(Error, Debug)]
pub enum SheetMapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid cell address '{0}'")]
    AddressParse(String),

    #[error("Column address error: {0}")]
    ColumnAddress(String),

    #[error("Failed to read merged cells: {0}")]
    MergeRead(String),

    #[error("Failed to normalize merged cells: {0}")]
    MergeWrite(String),

    #[error("Sheet '{sheet}' must have at least two rows (header + data), found {found}")]
    InsufficientRows { sheet: String, found: usize },

    #[error("Template compile error in column {column}: {message}")]
    TemplateCompile { column: u32, message: String },

    #[error("Template execution error: {0}")]
    TemplateExecution(String),

    #[error("Sheet '{0}' does not exist")]
    SheetNotFound(String),

    #[error("Stream writer error: {0}")]
    Stream(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Pipeline worker stopped without reporting completion")]
    PipelineAborted,
}

impl SheetMapError {
    /// True for errors raised while evaluating a header template against a record
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            SheetMapError::TemplateCompile { .. } | SheetMapError::TemplateExecution(_)
        )
    }
}
