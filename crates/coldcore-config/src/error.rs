//! Catalogue error types.

use coldcore_signing::{AccountCode, SigningError};
use thiserror::Error;

/// Catalogue errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An account with the same code, or sharing an xpub on the same coin, exists.
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(AccountCode),

    /// Account names must not be empty.
    #[error("Account name must not be empty")]
    AccountNameEmpty,

    /// No persisted account with this code.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountCode),

    /// Operation only valid on Ethereum accounts.
    #[error("Not an Ethereum account: {0}")]
    NotEthereumAccount(AccountCode),

    /// Regular accounts need at least one signing configuration.
    #[error("Account {0} has no signing configurations")]
    NoSigningConfigurations(AccountCode),

    /// Identity or path error.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for catalogue operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
