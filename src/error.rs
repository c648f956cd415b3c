//! Error types for followtide
//!
//! All errors in the engine are converted to `AppError`. The variants
//! follow the run's failure taxonomy: timeouts are retried by the fetch
//! layer, other remote failures abort a fetch, mutation failures are
//! per-account, and ledger failures are logged without aborting.

use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Timeout-class remote failure (retryable by the fetcher)
    #[error("Remote call timed out: {0}")]
    Timeout(String),

    /// Remote service answered with a non-success status
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Authentication against the remote service failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A listing fetch failed and was aborted
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A single follow/unfollow could not be applied
    #[error("Mutation failed: {0}")]
    Mutation(String),

    /// Ledger read/write failure
    #[error("Ledger I/O error: {0}")]
    LedgerIo(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// SQLite ledger backend error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CSV ledger backend error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Whether the failure is timeout-class and the same call may be retried.
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::HttpClient(error) => error.is_timeout(),
            _ => false,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Timeout(_) => "timeout",
            AppError::Remote { .. } => "remote",
            AppError::Auth(_) => "auth",
            AppError::Fetch(_) => "fetch",
            AppError::Mutation(_) => "mutation",
            AppError::LedgerIo(_) => "ledger_io",
            AppError::HttpClient(_) => "http_client",
            AppError::Database(_) => "database",
            AppError::Csv(_) => "csv",
            AppError::Io(_) => "io",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
