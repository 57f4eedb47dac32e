//! Error types shared by every component of the crate

use thiserror::Error;

/// Library error types
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type alias using CommonError
pub type Result<T> = std::result::Result<T, CommonError>;

impl From<sqlx::Error> for CommonError {
    fn from(err: sqlx::Error) -> Self {
        CommonError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        CommonError::InvalidQuery(err.to_string())
    }
}

impl From<reqwest::Error> for CommonError {
    fn from(err: reqwest::Error) -> Self {
        CommonError::SearchError(err.to_string())
    }
}

impl From<url::ParseError> for CommonError {
    fn from(err: url::ParseError) -> Self {
        CommonError::ConfigError(format!("invalid url: {}", err))
    }
}
