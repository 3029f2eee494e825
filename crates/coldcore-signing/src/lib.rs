//! # coldcore-signing
//!
//! Identity and key path model shared by every other coldcore crate.
//!
//! This crate provides:
//! - The closed coin catalogue, including ERC20 tokens
//! - Absolute BIP32 key paths
//! - Signing configurations (script type, keystore fingerprint, xpub)
//! - Account codes and their grammar
//! - Canonical key paths, default names and per-coin account limits
//!
//! ## Example
//!
//! ```ignore
//! use coldcore_signing::{regular_account_code, default_key_paths, Coin};
//!
//! let fingerprint = "55555555".parse()?;
//! let code = regular_account_code(fingerprint, Coin::Btc, 1);
//! assert_eq!(code.as_str(), "v0-55555555-btc-1");
//!
//! for (script_type, keypath) in default_key_paths(Coin::Btc, 1) {
//!     println!("{:?} {}", script_type, keypath);
//! }
//! ```

mod code;
mod coin;
mod configuration;
mod error;
mod keypath;
mod paths;

pub use code::{erc20_account_code, regular_account_code, AccountCode};
pub use coin::{
    erc20_token, format_units, Coin, Erc20Token, Network, ERC20_PREFIX, ERC20_TOKENS,
    LEGACY_SAI_TOKEN,
};
pub use configuration::{
    KeyInfo, RootFingerprint, ScriptType, SigningConfiguration, SigningConfigurations, XPub,
};
pub use error::{SigningError, SigningResult};
pub use keypath::{AbsoluteKeypath, KeyNode, HARDENED};
pub use paths::{
    account_hard_limit, btc_account_keypath, default_account_name, default_key_paths,
    eth_account_keypath, ACCOUNT_HARD_LIMIT, BTC_ACCOUNT_HARD_LIMIT, BTC_SCRIPT_TYPES,
    LTC_SCRIPT_TYPES,
};
