use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShortlistError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Usage(String),

    #[error("Error opening browser: {0}")]
    Browser(String),
}

impl ShortlistError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        ShortlistError::InvalidUrl(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        ShortlistError::Usage(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ShortlistError>;
