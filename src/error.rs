//! Error types for newsagg.

use thiserror::Error;

use crate::rss::FetchError;

/// Common error type for newsagg.
#[derive(Error, Debug)]
pub enum NewsaggError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant, whatever the backend.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration or task input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Feed retrieval failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Task queue error (declare, publish, claim, ack).
    #[error("queue error: {0}")]
    Queue(String),
}

impl From<sqlx::Error> for NewsaggError {
    fn from(e: sqlx::Error) -> Self {
        NewsaggError::Database(e.to_string())
    }
}

/// Result type alias for newsagg operations.
pub type Result<T> = std::result::Result<T, NewsaggError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = NewsaggError::Validation("poll interval too short".to_string());
        assert_eq!(err.to_string(), "validation error: poll interval too short");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NewsaggError = io_err.into();
        assert!(matches!(err, NewsaggError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_fetch_error_conversion() {
        let err: NewsaggError = FetchError::Status(503).into();
        assert!(matches!(err, NewsaggError::Fetch(FetchError::Status(503))));
        assert_eq!(err.to_string(), "fetch error: HTTP status 503");
    }

    #[test]
    fn test_queue_error_display() {
        let err = NewsaggError::Queue("publish failed".to_string());
        assert_eq!(err.to_string(), "queue error: publish failed");
    }
}
