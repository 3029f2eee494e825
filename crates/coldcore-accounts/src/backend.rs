//! Chain backend capability of a live account.

use crate::{AccountEvent, AccountResult};
use async_trait::async_trait;
use coldcore_signing::{
    AbsoluteKeypath, AccountCode, Coin, RootFingerprint, SigningConfiguration,
    SigningConfigurations,
};
use num_bigint::BigUint;
use serde::Serialize;
use std::sync::Arc;

/// Callback receiving account events.
pub type AccountObserver = Arc<dyn Fn(AccountEvent) + Send + Sync>;

/// Balance in the coin's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Balance {
    /// Confirmed and spendable.
    pub available: BigUint,
    /// Unconfirmed incoming.
    pub incoming: BigUint,
}

/// A transaction touching the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique within the account; key of transaction notes.
    pub internal_id: String,
    pub txid: String,
    /// Block height, 0 while unconfirmed.
    pub height: u64,
    pub amount: BigUint,
}

/// A receive address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    pub encoded: String,
    pub keypath: AbsoluteKeypath,
}

/// Unused receive addresses of one signing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressList {
    pub configuration: SigningConfiguration,
    pub addresses: Vec<Address>,
}

/// Configuration a live account is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub code: AccountCode,
    pub name: String,
    pub coin: Coin,
    /// Subset of the persisted configurations usable with the current keystore.
    pub configurations: SigningConfigurations,
    pub root_fingerprint: RootFingerprint,
    pub account_number: u16,
    pub inactive: bool,
    pub hidden_because_unused: bool,
    pub used: bool,
    /// Loaded although its keystore is not connected.
    pub watchonly: bool,
    pub insurance_status: Option<String>,
    /// Parent Ethereum account of an ERC20 sub-account.
    pub parent: Option<AccountCode>,
}

impl AccountConfig {
    pub fn is_erc20(&self) -> bool {
        self.parent.is_some()
    }

    /// Active and not hidden.
    pub fn is_visible(&self) -> bool {
        !self.inactive && !self.hidden_because_unused
    }
}

/// Per-account chain client (Electrum, Ethereum RPC, ...).
#[async_trait]
pub trait AccountBackend: Send + Sync {
    /// Start syncing. Called at most once per live account.
    async fn initialize(&self) -> AccountResult<()>;

    async fn transactions(&self) -> AccountResult<Vec<Transaction>>;

    async fn balance(&self) -> AccountResult<Balance>;

    /// Unused receive addresses per signing configuration, in configuration order.
    async fn unused_receive_addresses(&self) -> AccountResult<Vec<AddressList>>;

    fn synced(&self) -> bool;

    /// Register the callback for account events.
    fn observe(&self, observer: AccountObserver);

    fn close(&self);

    fn fatal_error(&self) -> bool;

    /// Whether `address` belongs to the account. Ethereum only.
    async fn matches_address(&self, _address: &str) -> AccountResult<bool> {
        Ok(false)
    }
}

/// Builds chain backends for live accounts.
pub trait AccountFactory: Send + Sync {
    fn make_btc_account(&self, config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>>;

    /// Ethereum accounts and ERC20 sub-accounts.
    fn make_eth_account(&self, config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>>;
}
