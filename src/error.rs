use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalystError {
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Explanation unavailable: {0}")]
    ExplanationUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::prelude::PolarsError> for AnalystError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AnalystError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalystError>;
