//! Error types for the untisync ecosystem.

use thiserror::Error;

/// Errors that can occur in untisync operations.
#[derive(Error, Debug)]
pub enum UntisyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No credentials stored. Run `untisync auth` first.")]
    NotAuthenticated,

    #[error("Login failed: {0}")]
    Login(String),

    #[error("WebUntis API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid date/time value: {0}")]
    InvalidDateTime(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for untisync operations.
pub type UntisyncResult<T> = Result<T, UntisyncError>;
