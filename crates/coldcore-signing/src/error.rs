//! Signing model error types.

use thiserror::Error;

/// Errors raised while parsing or deriving identity and path data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// Coin code not in the supported set.
    #[error("Unknown coin code: {0}")]
    UnknownCoin(String),

    /// Key path could not be parsed.
    #[error("Invalid keypath {path}: {reason}")]
    InvalidKeypath { path: String, reason: String },

    /// Root fingerprint is not 4 bytes of hex.
    #[error("Invalid root fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Account code does not match the code grammar.
    #[error("Invalid account code: {0}")]
    InvalidAccountCode(String),

    /// A signing configuration list was empty where one was required.
    #[error("No signing configurations")]
    NoConfigurations,

    /// Key path too short to carry an account number.
    #[error("Keypath {0} does not encode an account number")]
    NoAccountNumber(String),
}

/// Result type for signing model operations.
pub type SigningResult<T> = Result<T, SigningError>;
