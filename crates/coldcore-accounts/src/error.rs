//! Account error types.

use coldcore_signing::Coin;
use thiserror::Error;

/// Errors from live accounts and their backends.
#[derive(Error, Debug)]
pub enum AccountError {
    /// No backend available for the coin.
    #[error("Unsupported coin: {0}")]
    UnsupportedCoin(Coin),

    /// The backend failed to initialize.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Fetching data from the chain backend failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The account was closed.
    #[error("Account closed")]
    Closed,

    /// Note exceeds the maximum length.
    #[error("Note too long: {len} bytes, max {max}")]
    NoteTooLong { len: usize, max: usize },

    /// Persisting notes failed.
    #[error("Config error: {0}")]
    Config(#[from] coldcore_config::ConfigError),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for account operations.
pub type AccountResult<T> = Result<T, AccountError>;
