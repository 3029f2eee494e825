//! Account codes.
//!
//! Grammar:
//!
//! ```text
//! regular := "v0-" hex8 "-" coin_code "-" uint
//! erc20   := regular "-eth-erc20-" token_symbol
//! ```
//!
//! The `v0-` prefix leaves room for a future derivation change without
//! colliding with codes already stored in notes files.

use crate::{Coin, RootFingerprint, SigningError, SigningResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static REGULAR_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v0-([0-9a-f]{8})-([a-z]+)-(\d+)$").expect("static regex")
});

static ERC20_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(v0-[0-9a-f]{8}-[a-z]+-\d+)-(eth-erc20-[a-z0-9]+)$").expect("static regex")
});

/// Globally unique account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCode(String);

impl AccountCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a regular code into `(fingerprint, coin code, account number)`.
    pub fn parse_regular(&self) -> SigningResult<(RootFingerprint, String, u16)> {
        let caps = REGULAR_CODE
            .captures(&self.0)
            .ok_or_else(|| SigningError::InvalidAccountCode(self.0.clone()))?;
        let fingerprint: RootFingerprint = caps[1].parse()?;
        let number = caps[3]
            .parse()
            .map_err(|_| SigningError::InvalidAccountCode(self.0.clone()))?;
        Ok((fingerprint, caps[2].to_string(), number))
    }

    /// Split an ERC20 sub-account code into `(parent code, token code)`.
    pub fn parse_erc20(&self) -> Option<(AccountCode, String)> {
        let caps = ERC20_CODE.captures(&self.0)?;
        Some((AccountCode::new(&caps[1]), caps[2].to_string()))
    }

    pub fn is_erc20(&self) -> bool {
        ERC20_CODE.is_match(&self.0)
    }
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for AccountCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Code of a regular account.
pub fn regular_account_code(fingerprint: RootFingerprint, coin: Coin, number: u16) -> AccountCode {
    AccountCode(format!("v0-{}-{}-{}", fingerprint.to_hex(), coin.code(), number))
}

/// Code of an ERC20 sub-account of an Ethereum account.
pub fn erc20_account_code(parent: &AccountCode, token_code: &str) -> AccountCode {
    AccountCode(format!("{}-{}", parent.as_str(), token_code))
}
