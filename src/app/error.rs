//! Error types for the live view

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status} for {endpoint}")]
    BackendStatus { endpoint: String, status: u16 },

    #[error("backend rejected {action}: {message}")]
    Rejected { action: String, message: String },

    #[error("invalid backend URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid snapshot file: {0}")]
    InvalidSnapshot(String),

    #[error("invalid exclusion pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl From<WatchError> for std::io::Error {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::Io(inner) => inner,
            other => std::io::Error::other(other),
        }
    }
}
