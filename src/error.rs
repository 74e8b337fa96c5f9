use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "xlsx")]
    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed rate card (row {row}, column '{column}'): {detail}")]
    MalformedRateCard {
        row: usize,
        column: String,
        detail: String,
    },

    #[error("Missing column in transaction export: {0}")]
    MissingField(String),

    #[error("Unknown processor (no rate card entry): {0}")]
    UnknownProcessor(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("No input found: {0}")]
    InputNotFound(String),

    #[error("Channel not allowed: {0}")]
    ChannelNotAllowed(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, FeeError>;
