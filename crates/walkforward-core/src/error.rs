use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Insufficient window: {window_days} observations must exceed the {num_assets} assets in the universe")]
    InsufficientWindow {
        window_days: usize,
        num_assets: usize,
    },

    #[error("Degenerate variance in {context}")]
    DegenerateVariance { context: String },

    #[error("Misaligned data at row {row} ({date}): {reason}")]
    MisalignedData {
        row: usize,
        date: NaiveDate,
        reason: String,
    },

    #[error("Invalid weights: {reason}")]
    InvalidWeights { reason: String },

    #[error("Singular matrix in {context}")]
    SingularMatrix { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for WalkForwardError {
    fn from(e: serde_json::Error) -> Self {
        WalkForwardError::SerializationError(e.to_string())
    }
}
