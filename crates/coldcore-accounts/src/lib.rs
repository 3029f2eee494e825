//! # coldcore-accounts
//!
//! Runtime side of accounts.
//!
//! This crate provides:
//! - [`AccountBackend`]: the chain client capability behind each live account
//! - [`AccountFactory`]: builds backends for Bitcoin-family and Ethereum accounts
//! - [`LiveAccount`]: a persisted account plus runtime state
//! - [`Notes`]: per-account transaction notes
//! - [`EventBus`]: the ordered notification stream towards the UI

mod account;
mod backend;
mod error;
mod events;
mod notes;

pub use account::LiveAccount;
pub use backend::{
    AccountBackend, AccountConfig, AccountFactory, AccountObserver, Address, AddressList,
    Balance, Transaction,
};
pub use error::{AccountError, AccountResult};
pub use events::{
    AccountEvent, Action, Event, EventBus, SUBJECT_ACCOUNTS, SUBJECT_AOPP,
    SUBJECT_CONNECT_KEYSTORE,
};
pub use notes::{Notes, NotesData, MAX_NOTE_LEN};

/// Subject under which an account's own events are forwarded.
pub fn account_subject(code: &coldcore_signing::AccountCode, subject: &str) -> String {
    format!("account/{}/{}", code, subject)
}
