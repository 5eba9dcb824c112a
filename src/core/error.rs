use thiserror::Error;

/// Centralized error types for the application
///
/// All errors in the application are converted to this enum for consistent error handling.
/// Uses `thiserror` for automatic error conversion and display formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Validation errors (bad/missing request fields, malformed URLs)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Extraction-engine failures (bad format selector, geo restriction, network)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Requested artifact missing or already consumed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server at capacity; the caller should retry later
    #[error("Busy: {0}")]
    Busy(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Helper conversion so fetcher plumbing can bubble plain strings up as fetch errors
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Fetch(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Fetch(err.to_string())
    }
}
