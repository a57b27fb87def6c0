use thiserror::Error;

use crate::models::PayrollField;

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("File is empty or has no data.")]
    EmptySheet,

    #[error("Please select {0} column.")]
    MissingColumn(PayrollField),

    #[error("Column {index} selected for {field} is outside the sheet ({width} columns).")]
    ColumnOutOfRange {
        field: PayrollField,
        index: usize,
        width: usize,
    },

    #[error("Column {index} does not exist ({width} columns).")]
    CellOutOfRange { index: usize, width: usize },

    #[error("Please select at least one row to process.")]
    EmptySelection,

    #[error("No data to export. Please process data first.")]
    NoRecords,

    #[error("Row {index} does not exist ({len} rows).")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Tier {index} does not exist ({len} tiers).")]
    TierOutOfRange { index: usize, len: usize },

    #[error("At least one tier must remain.")]
    LastTier,

    #[error("Invalid tier {field}: {value}")]
    InvalidTierValue { field: &'static str, value: f64 },

    #[error("Invalid file format. Please select a valid JSON file. ({0})")]
    InvalidTierImport(String),

    #[error("Could not read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("Could not write Excel file: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

pub type Result<T> = std::result::Result<T, PayrollError>;
