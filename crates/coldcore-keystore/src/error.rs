//! Keystore error types.

use thiserror::Error;

/// Errors reported by a keystore.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeystoreError {
    /// The user rejected the request on the device.
    #[error("Aborted by the user")]
    UserAbort,

    /// The keystore does not support the requested coin or script type.
    #[error("Unsupported by keystore: {0}")]
    Unsupported(String),

    /// The keystore was disconnected during the request.
    #[error("Keystore disconnected")]
    Disconnected,

    /// Any other device failure.
    #[error("Keystore error: {0}")]
    Device(String),
}

impl KeystoreError {
    /// True if the user canceled on the device.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, KeystoreError::UserAbort)
    }
}

/// Result type for keystore operations.
pub type KeystoreResult<T> = Result<T, KeystoreError>;

/// Outcome of a pending connect-keystore request other than success.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// A keystore with a different fingerprint was connected. Retryable.
    #[error("Wrong keystore")]
    WrongKeystore,

    /// No matching keystore connected in time. Retryable.
    #[error("Timed out waiting for keystore")]
    Timeout,

    /// A newer request took the slot. Not shown to the user.
    #[error("Request replaced")]
    Replaced,

    /// The user dismissed the prompt. Not shown to the user.
    #[error("Canceled by the user")]
    UserAbort,
}

impl ConnectError {
    /// Code sent with `connect-keystore` error prompts.
    pub fn code(&self) -> &'static str {
        match self {
            ConnectError::WrongKeystore => "wrongKeystore",
            ConnectError::Timeout => "timeout",
            ConnectError::Replaced => "replaced",
            ConnectError::UserAbort => "userAbort",
        }
    }

    /// True for outcomes the UI must not report as errors.
    pub fn is_silent(&self) -> bool {
        matches!(self, ConnectError::Replaced | ConnectError::UserAbort)
    }
}
