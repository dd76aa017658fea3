use thiserror::Error;

#[derive(Error, Debug)]
pub enum TillrollError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Unknown receipt: {0}")]
    UnknownReceipt(String),

    /// Raised when an operation would break the "no silent double count"
    /// guarantee. Fatal to the operation, never to the process.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TillrollError>;
