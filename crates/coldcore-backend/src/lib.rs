//! # coldcore-backend
//!
//! Account lifecycle and coordination core of the wallet backend.
//!
//! [`Backend`] owns the persisted catalogue, the live account registry and the
//! registered keystore. It provides:
//! - Keystore registration, default accounts and signing configuration upgrades
//! - Account discovery through hidden accounts
//! - Account operations: create, activate, rename, ERC20 tokens, insurance
//! - The connect-keystore prompt loop
//! - AOPP address ownership proofs
//! - Notes export and import (BIP-329)
//! - Balance aggregation per keystore and per coin
//!
//! All UI notifications go through one ordered event stream returned by
//! [`Backend::new`].

mod aopp;
mod backend;
mod balance;
mod collaborators;
mod discovery;
mod error;
mod notes;
mod operations;
mod options;
mod registry;

pub use aopp::{Aopp, AoppAccount, AoppErrorCode, AoppState};
pub use backend::Backend;
pub use balance::{format_fiat, CoinTotal, KeystoreBalance};
pub use collaborators::{
    CollaboratorError, Collaborators, Environment, InsuranceClient, InsuranceDetails,
    InsuranceQuery, RatesUpdater,
};
pub use error::{BackendError, BackendResult};
pub use notes::{
    parse_bip329, Bip329Entry, BitBoxAppExtension, NotesImportResult, NOTES_EXPORT_FILENAME,
};
pub use options::BackendOptions;
