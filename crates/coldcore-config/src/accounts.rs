//! Persisted accounts and keystores.

use crate::{ConfigError, ConfigResult};
use chrono::{DateTime, Utc};
use coldcore_signing::{
    AccountCode, Coin, RootFingerprint, SigningConfigurations, SigningResult, XPub,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

/// A persisted account.
///
/// ERC20 sub-accounts are never stored here; they are listed in the parent
/// Ethereum account's `active_tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// At least one transaction was seen.
    #[serde(default, skip_serializing_if = "is_false")]
    pub used: bool,
    #[serde(default)]
    pub inactive: bool,
    /// Added for background scanning, not shown until used or created by the user.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden_because_unused: bool,
    pub coin_code: String,
    pub name: String,
    pub code: AccountCode,
    pub configurations: SigningConfigurations,
    /// ERC20 token codes to load as sub-accounts (Ethereum only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_status: Option<String>,
    /// Fields written by newer versions, kept on round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Account {
    pub fn coin(&self) -> SigningResult<Coin> {
        self.coin_code.parse()
    }

    pub fn root_fingerprint(&self) -> SigningResult<RootFingerprint> {
        self.configurations.root_fingerprint()
    }

    pub fn account_number(&self) -> SigningResult<u16> {
        self.configurations.account_number()
    }

    /// Mark as used; a used account is never hidden.
    pub fn set_used(&mut self) {
        self.used = true;
        self.hidden_because_unused = false;
    }

    fn belongs_to(&self, coin: Coin, fingerprint: RootFingerprint) -> bool {
        self.coin_code == coin.code()
            && self.root_fingerprint().map_or(false, |fp| fp == fingerprint)
    }
}

/// A persisted keystore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keystore {
    pub root_fingerprint: RootFingerprint,
    pub name: String,
    /// Keep accounts loaded while the keystore is disconnected.
    #[serde(default)]
    pub watchonly: bool,
    pub last_connected: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub backup_reminder_allowed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Keystore {
    fn new(root_fingerprint: RootFingerprint) -> Self {
        Self {
            root_fingerprint,
            name: String::new(),
            watchonly: false,
            last_connected: Utc::now(),
            backup_reminder_allowed: true,
            extra: Map::new(),
        }
    }
}

/// Contents of `accounts.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsConfig {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub keystores: Vec<Keystore>,
}

impl AccountsConfig {
    pub fn lookup(&self, code: &AccountCode) -> Option<&Account> {
        self.accounts.iter().find(|account| &account.code == code)
    }

    pub fn lookup_mut(&mut self, code: &AccountCode) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| &account.code == code)
    }

    /// Like [`lookup_mut`](Self::lookup_mut) but fails with `AccountNotFound`.
    pub fn account_mut(&mut self, code: &AccountCode) -> ConfigResult<&mut Account> {
        self.lookup_mut(code)
            .ok_or_else(|| ConfigError::AccountNotFound(code.clone()))
    }

    /// Code of the account having `xpub` in any of its signing configurations.
    pub fn lookup_by_xpub(&self, xpub: &XPub) -> Option<AccountCode> {
        self.accounts
            .iter()
            .find(|account| account.configurations.iter().any(|c| c.xpub() == xpub))
            .map(|account| account.code.clone())
    }

    pub fn lookup_keystore(&self, fingerprint: RootFingerprint) -> Option<&Keystore> {
        self.keystores
            .iter()
            .find(|keystore| keystore.root_fingerprint == fingerprint)
    }

    pub fn get_or_add_keystore(&mut self, fingerprint: RootFingerprint) -> &mut Keystore {
        let index = match self
            .keystores
            .iter()
            .position(|keystore| keystore.root_fingerprint == fingerprint)
        {
            Some(index) => index,
            None => {
                self.keystores.push(Keystore::new(fingerprint));
                self.keystores.len() - 1
            }
        };
        &mut self.keystores[index]
    }

    /// True if the owning keystore is watch-only and the account is not hidden.
    pub fn is_account_watchonly(&self, account: &Account) -> bool {
        if account.hidden_because_unused {
            return false;
        }
        account
            .root_fingerprint()
            .ok()
            .and_then(|fp| self.lookup_keystore(fp))
            .map_or(false, |keystore| keystore.watchonly)
    }

    /// True if any account belongs to the keystore.
    pub fn has_accounts_for(&self, fingerprint: RootFingerprint) -> bool {
        self.accounts
            .iter()
            .any(|account| account.configurations.contains_root_fingerprint(fingerprint))
    }

    /// Accounts of one coin and keystore.
    pub fn accounts_for(
        &self,
        coin: Coin,
        fingerprint: RootFingerprint,
    ) -> impl Iterator<Item = &Account> {
        self.accounts
            .iter()
            .filter(move |account| account.belongs_to(coin, fingerprint))
    }

    /// Account with the highest account number for the coin and keystore.
    pub fn highest_account(&self, coin: Coin, fingerprint: RootFingerprint) -> Option<&Account> {
        self.accounts_for(coin, fingerprint)
            .filter_map(|account| account.account_number().ok().map(|n| (n, account)))
            .max_by_key(|(number, _)| *number)
            .map(|(_, account)| account)
    }

    /// Account number following the highest existing one, 0 if there is none.
    pub fn next_account_number(&self, coin: Coin, fingerprint: RootFingerprint) -> u16 {
        self.highest_account(coin, fingerprint)
            .and_then(|account| account.account_number().ok())
            .map_or(0, |number| number + 1)
    }

    /// The hidden unused account with the smallest account number.
    ///
    /// Hidden accounts only ever exist at the tail of the account numbers.
    pub fn find_hidden_account(&self, coin: Coin, fingerprint: RootFingerprint) -> Option<&Account> {
        let hidden = self
            .accounts_for(coin, fingerprint)
            .filter(|account| account.hidden_because_unused)
            .filter_map(|account| account.account_number().ok().map(|n| (n, account)))
            .min_by_key(|(number, _)| *number);
        if let Some((number, _)) = hidden {
            debug_assert!(
                self.accounts_for(coin, fingerprint).all(|account| {
                    account.hidden_because_unused
                        || account.account_number().map_or(true, |n| n < number)
                }),
                "visible account after a hidden one"
            );
        }
        hidden.map(|(_, account)| account)
    }

    /// Add a new account.
    ///
    /// Fails if the name is empty, the code is taken, or an account of the same
    /// coin already uses one of its xpubs.
    pub fn persist_account(&mut self, account: Account) -> ConfigResult<()> {
        if account.name.trim().is_empty() {
            return Err(ConfigError::AccountNameEmpty);
        }
        if account.configurations.is_empty() {
            return Err(ConfigError::NoSigningConfigurations(account.code));
        }
        if self.lookup(&account.code).is_some() {
            return Err(ConfigError::AccountAlreadyExists(account.code));
        }
        let duplicate = self.accounts.iter().any(|existing| {
            existing.coin_code == account.coin_code
                && existing.configurations.shares_xpub_with(&account.configurations)
        });
        if duplicate {
            return Err(ConfigError::AccountAlreadyExists(account.code));
        }
        debug!(code = %account.code, "Persisting account");
        self.accounts.push(account);
        Ok(())
    }

    /// Add or remove an ERC20 token of an Ethereum account.
    ///
    /// Newly activated tokens are appended, keeping insertion order.
    pub fn set_token_active(
        &mut self,
        code: &AccountCode,
        token_code: &str,
        active: bool,
    ) -> ConfigResult<()> {
        let account = self.account_mut(code)?;
        if account.coin_code != Coin::Eth.code() {
            return Err(ConfigError::NotEthereumAccount(code.clone()));
        }
        account.active_tokens.retain(|token| token != token_code);
        if active {
            account.active_tokens.push(token_code.to_string());
        }
        Ok(())
    }
}
