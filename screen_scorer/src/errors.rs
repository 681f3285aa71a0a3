use lowess::prelude::LowessError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Failures raised by the scoring stages. Every variant is a deterministic
/// failure of one sample's pipeline; nothing here is retried.
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Missing column `{column}` in {table}")]
    MissingColumn { column: String, table: String },
    #[error("Unmatched key: {0}")]
    UnmatchedKey(String),
    #[error("Insufficient data: {0}")]
    DataInsufficient(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ScreenResult<T> = Result<T, ScreenError>;

impl From<LowessError> for ScreenError {
    fn from(e: LowessError) -> Self {
        match e {
            LowessError::EmptyInput | LowessError::TooFewPoints { .. } => {
                ScreenError::DataInsufficient(format!("LOWESS: {}", e))
            }
            LowessError::InvalidNumericValue(_) => ScreenError::MalformedInput(format!("LOWESS: {}", e)),
            other => ScreenError::InvalidParameter(format!("LOWESS: {}", other)),
        }
    }
}

pub fn missing_column(column: &str, table: &str) -> ScreenError {
    ScreenError::MissingColumn {
        column: column.to_string(),
        table: table.to_string(),
    }
}
