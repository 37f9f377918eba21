use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Cardinality probe for '{group}' failed: {reason}")]
    SchemaProbe { group: String, reason: String },

    #[error("Row fetch failed: {0}")]
    RowFetch(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Invalid layout: {0}")]
    Layout(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;
