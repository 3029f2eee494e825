//! # coldcore-keystore
//!
//! The signer side of the backend.
//!
//! - [`Keystore`]: capability trait implemented by device drivers
//! - [`ConnectKeystore`]: single-slot coordinator that waits for a specific
//!   keystore to be connected, with timeout, cancel and replace semantics

mod connect;
mod error;
mod keystore;

pub use connect::{ConnectKeystore, ConnectResult, RetryCallback, DEFAULT_CONNECT_TIMEOUT};
pub use error::{ConnectError, KeystoreError, KeystoreResult};
pub use keystore::Keystore;
