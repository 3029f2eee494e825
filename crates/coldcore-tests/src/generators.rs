//! Test data generators.
//!
//! Deterministic fingerprints, xpubs, persisted accounts and BIP-329 lines.

use coldcore_accounts::Transaction;
use coldcore_backend::{Bip329Entry, BitBoxAppExtension};
use coldcore_config::Account;
use coldcore_signing::{
    default_account_name, default_key_paths, regular_account_code, AbsoluteKeypath, AccountCode,
    Coin, RootFingerprint, ScriptType, SigningConfiguration, SigningConfigurations, XPub,
};
use num_bigint::BigUint;

/// Fingerprint of the default mock keystore.
pub const TEST_FINGERPRINT: RootFingerprint = RootFingerprint([0x55, 0x55, 0x55, 0x55]);

/// Native segwit receive address served by mock Bitcoin accounts.
pub const BTC_P2WPKH_ADDRESS: &str = "bc1qxp6xr63t098rl9udlynrktq00un6vqduzjgua3";

/// Signature returned by the mock keystore.
pub const TEST_SIGNATURE: &[u8] = b"signature";

pub fn fingerprint(seed: u8) -> RootFingerprint {
    RootFingerprint([seed; 4])
}

/// Deterministic xpub of a key path.
pub fn test_xpub(fingerprint: RootFingerprint, coin: Coin, keypath: &AbsoluteKeypath) -> XPub {
    XPub(format!("xpub-{}-{}-{}", fingerprint, coin.code(), keypath))
}

/// Signing configurations of account `number`, restricted to `script_types`
/// if given.
pub fn test_configurations(
    fingerprint: RootFingerprint,
    coin: Coin,
    number: u16,
    script_types: Option<&[ScriptType]>,
) -> SigningConfigurations {
    default_key_paths(coin, number)
        .into_iter()
        .filter(|(script_type, _)| match (script_types, script_type) {
            (Some(allowed), Some(script_type)) => allowed.contains(script_type),
            _ => true,
        })
        .map(|(script_type, keypath)| {
            let xpub = test_xpub(fingerprint, coin, &keypath);
            match script_type {
                Some(script_type) => {
                    SigningConfiguration::bitcoin(script_type, fingerprint, keypath, xpub)
                }
                None => SigningConfiguration::ethereum(fingerprint, keypath, xpub),
            }
        })
        .collect()
}

/// Persisted account with the default name and all canonical script types.
pub fn test_account(fingerprint: RootFingerprint, coin: Coin, number: u16) -> Account {
    account_with(
        fingerprint,
        coin,
        number,
        test_configurations(fingerprint, coin, number, None),
    )
}

pub fn account_with(
    fingerprint: RootFingerprint,
    coin: Coin,
    number: u16,
    configurations: SigningConfigurations,
) -> Account {
    Account {
        used: false,
        inactive: false,
        hidden_because_unused: false,
        coin_code: coin.code().to_string(),
        name: default_account_name(coin.name(), number),
        code: regular_account_code(fingerprint, coin, number),
        configurations,
        active_tokens: Vec::new(),
        insurance_status: None,
        extra: Default::default(),
    }
}

pub fn hidden_account(fingerprint: RootFingerprint, coin: Coin, number: u16) -> Account {
    Account {
        hidden_because_unused: true,
        ..test_account(fingerprint, coin, number)
    }
}

pub fn code(s: &str) -> AccountCode {
    AccountCode::from(s)
}

pub fn test_transaction(internal_id: &str) -> Transaction {
    Transaction {
        internal_id: internal_id.to_string(),
        txid: internal_id.split(':').next().unwrap_or(internal_id).to_string(),
        height: 100,
        amount: BigUint::from(1000u32),
    }
}

/// One BIP-329 line, optionally with the account extension.
pub fn bip329_line(
    kind: &str,
    reference: &str,
    label: &str,
    account: Option<(&str, &str)>,
) -> String {
    let entry = Bip329Entry {
        kind: kind.to_string(),
        reference: reference.to_string(),
        label: label.to_string(),
        bitboxapp: account.map(|(coin_code, code)| BitBoxAppExtension {
            coin_code: coin_code.to_string(),
            code: AccountCode::from(code),
        }),
    };
    serde_json::to_string(&entry).expect("entry serializes")
}
