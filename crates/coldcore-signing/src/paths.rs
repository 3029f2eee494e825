//! Canonical key paths and account naming.

use crate::{AbsoluteKeypath, Coin, KeyNode, ScriptType};

/// Hard limit on accounts per coin and keystore for Bitcoin-family coins.
///
/// One higher than [`ACCOUNT_HARD_LIMIT`]: older releases allowed creating
/// accounts 0..=5 manually.
pub const BTC_ACCOUNT_HARD_LIMIT: usize = 6;

/// Hard limit on accounts per coin and keystore for all other coins.
pub const ACCOUNT_HARD_LIMIT: usize = 5;

/// Script types of a unified Bitcoin account, canonical first.
pub const BTC_SCRIPT_TYPES: [ScriptType; 4] = [
    ScriptType::P2wpkh,
    ScriptType::P2tr,
    ScriptType::P2wpkhP2sh,
    ScriptType::P2pkh,
];

/// Script types of a unified Litecoin account.
pub const LTC_SCRIPT_TYPES: [ScriptType; 2] = [ScriptType::P2wpkh, ScriptType::P2wpkhP2sh];

/// Account-level key path of a Bitcoin-family script type.
pub fn btc_account_keypath(coin: Coin, script_type: ScriptType, number: u16) -> AbsoluteKeypath {
    AbsoluteKeypath::new(vec![
        KeyNode::hardened(script_type.purpose()),
        KeyNode::hardened(coin.bip44_coin_type()),
        KeyNode::hardened(number as u32),
    ])
}

/// Ethereum account key path `m/44'/60'/0'/0/n`.
///
/// The trailing index is not hardened, matching existing signers.
pub fn eth_account_keypath(coin: Coin, number: u16) -> AbsoluteKeypath {
    AbsoluteKeypath::new(vec![
        KeyNode::hardened(44),
        KeyNode::hardened(coin.bip44_coin_type()),
        KeyNode::hardened(0),
        KeyNode::normal(0),
        KeyNode::normal(number as u32),
    ])
}

/// Canonical key paths of an account, canonical script type first.
///
/// Ethereum-family coins yield a single entry without script type.
pub fn default_key_paths(coin: Coin, number: u16) -> Vec<(Option<ScriptType>, AbsoluteKeypath)> {
    let script_types: &[ScriptType] = match coin {
        Coin::Btc | Coin::Tbtc | Coin::Rbtc => &BTC_SCRIPT_TYPES,
        Coin::Ltc | Coin::Tltc => &LTC_SCRIPT_TYPES,
        Coin::Eth | Coin::Sepeth | Coin::Erc20(_) => {
            return vec![(None, eth_account_keypath(coin, number))]
        }
    };
    script_types
        .iter()
        .map(|script_type| {
            (
                Some(*script_type),
                btc_account_keypath(coin, *script_type, number),
            )
        })
        .collect()
}

/// `"<name>"` for the first account, `"<name> <n+1>"` after that.
pub fn default_account_name(coin_name: &str, number: u16) -> String {
    if number == 0 {
        coin_name.to_string()
    } else {
        format!("{} {}", coin_name, number as u32 + 1)
    }
}

pub fn account_hard_limit(coin: Coin) -> usize {
    if coin.is_btc_family() {
        BTC_ACCOUNT_HARD_LIMIT
    } else {
        ACCOUNT_HARD_LIMIT
    }
}
