use thiserror::Error;

/// Failures that stop a report run
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    #[error("Input file is empty: {path}")]
    EmptyInput { path: String },

    #[error("Missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("Column '{column}' contains a non-numeric value {value:?} at row {row}")]
    NonNumericValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
