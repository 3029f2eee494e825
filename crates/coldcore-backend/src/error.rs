//! Backend error types.

use coldcore_accounts::AccountError;
use coldcore_config::ConfigError;
use coldcore_keystore::{ConnectError, KeystoreError};
use coldcore_signing::{AccountCode, RootFingerprint, SigningError};
use thiserror::Error;

use crate::collaborators::CollaboratorError;

/// Backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Same code or a shared xpub on the same coin.
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(AccountCode),

    /// Per-coin account limit reached, or the keystore supports one account only.
    #[error("Account limit reached")]
    AccountLimitReached,

    /// Account names must not be empty.
    #[error("Account name must not be empty")]
    AccountNameEmpty,

    /// Coin not supported by the keystore or the backend.
    #[error("Unsupported coin: {0}")]
    UnsupportedCoin(String),

    /// No such account.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountCode),

    /// No Ethereum account owns the address.
    #[error("No account for address {0}")]
    AddressNotFound(String),

    /// Operation only valid on Ethereum accounts.
    #[error("Not an Ethereum account: {0}")]
    NotEthereumAccount(AccountCode),

    /// No keystore with this fingerprint is known.
    #[error("Keystore not found: {0}")]
    KeystoreNotFound(RootFingerprint),

    /// A line of a notes import could not be parsed.
    #[error("Invalid notes on line {line}: {reason}")]
    InvalidNotes { line: usize, reason: String },

    /// Constructed outside a tokio runtime.
    #[error("No tokio runtime available")]
    NoRuntime,

    /// Catalogue error.
    #[error("Config error: {0}")]
    Config(ConfigError),

    /// Keystore error.
    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    /// Connect-keystore request did not succeed.
    #[error("Connect keystore: {0}")]
    Connect(#[from] ConnectError),

    /// Live account or chain backend error.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Rates, insurance or environment collaborator failed.
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Identity or path error.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for BackendError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::AccountAlreadyExists(code) => BackendError::AccountAlreadyExists(code),
            ConfigError::AccountNameEmpty => BackendError::AccountNameEmpty,
            ConfigError::AccountNotFound(code) => BackendError::AccountNotFound(code),
            ConfigError::NotEthereumAccount(code) => BackendError::NotEthereumAccount(code),
            ConfigError::Signing(err) => BackendError::Signing(err),
            other => BackendError::Config(other),
        }
    }
}

impl BackendError {
    /// Stable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::AccountAlreadyExists(_) => "accountAlreadyExists",
            BackendError::AccountLimitReached => "accountLimitReached",
            BackendError::AccountNameEmpty => "accountNameEmpty",
            BackendError::UnsupportedCoin(_) => "unsupportedCoin",
            BackendError::AccountNotFound(_) => "accountNotFound",
            BackendError::AddressNotFound(_) => "addressNotFound",
            BackendError::Connect(err) => err.code(),
            _ => "unknown",
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
