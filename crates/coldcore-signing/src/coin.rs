//! Coin catalogue.
//!
//! The supported coins form a closed set. ERC20 tokens are synthetic coins
//! whose codes are prefixed with `eth-erc20-` and which live on top of an
//! Ethereum mainnet account.

use crate::{SigningError, SigningResult};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every ERC20 token code.
pub const ERC20_PREFIX: &str = "eth-erc20-";

/// Legacy Sai token code, removed from persisted accounts on load.
pub const LEGACY_SAI_TOKEN: &str = "eth-erc20-sai0x89d";

/// Chain network a coin lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

/// A fungible token on Ethereum mainnet.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Erc20Token {
    /// Full coin code, e.g. `eth-erc20-usdt`.
    pub code: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Ticker used for rates and formatting.
    pub unit: &'static str,
    /// Contract address (checksummed).
    pub contract: &'static str,
    /// Smallest-unit decimals.
    pub decimals: u32,
}

/// Known ERC20 tokens.
pub static ERC20_TOKENS: &[Erc20Token] = &[
    Erc20Token {
        code: "eth-erc20-usdt",
        name: "Tether USD",
        unit: "USDT",
        contract: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        decimals: 6,
    },
    Erc20Token {
        code: "eth-erc20-usdc",
        name: "USD Coin",
        unit: "USDC",
        contract: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        decimals: 6,
    },
    Erc20Token {
        code: "eth-erc20-link",
        name: "Chainlink",
        unit: "LINK",
        contract: "0x514910771AF9Ca656af840dff83E8264EcF986CA",
        decimals: 18,
    },
    Erc20Token {
        code: "eth-erc20-bat",
        name: "Basic Attention Token",
        unit: "BAT",
        contract: "0x0D8775F648430679A709E98d2b0Cb6250d2887EF",
        decimals: 18,
    },
    Erc20Token {
        code: "eth-erc20-mkr",
        name: "Maker",
        unit: "MKR",
        contract: "0x9f8F72aA9304c8B593d555F12eF6589cC3A579A2",
        decimals: 18,
    },
    Erc20Token {
        code: "eth-erc20-zrx",
        name: "0x",
        unit: "ZRX",
        contract: "0xE41d2489571d322189246DaFA5ebDe1F4699F498",
        decimals: 18,
    },
    Erc20Token {
        code: "eth-erc20-wbtc",
        name: "Wrapped Bitcoin",
        unit: "WBTC",
        contract: "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599",
        decimals: 8,
    },
    Erc20Token {
        code: "eth-erc20-paxg",
        name: "Pax Gold",
        unit: "PAXG",
        contract: "0x45804880De22913dAFE09f4980848ECE6EcbAf78",
        decimals: 18,
    },
    Erc20Token {
        code: "eth-erc20-dai0x6b17",
        name: "Dai",
        unit: "DAI",
        contract: "0x6B175474E89094C44Da98b954EedeAC495271d0F",
        decimals: 18,
    },
];

/// Look up a token by its full code.
pub fn erc20_token(code: &str) -> Option<&'static Erc20Token> {
    ERC20_TOKENS.iter().find(|token| token.code == code)
}

/// Supported coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coin {
    Btc,
    Tbtc,
    Rbtc,
    Ltc,
    Tltc,
    Eth,
    Sepeth,
    Erc20(&'static Erc20Token),
}

impl Coin {
    /// Every non-token coin, in display order.
    pub const BASE: [Coin; 7] = [
        Coin::Btc,
        Coin::Tbtc,
        Coin::Rbtc,
        Coin::Ltc,
        Coin::Tltc,
        Coin::Eth,
        Coin::Sepeth,
    ];

    /// Coin code as persisted.
    pub fn code(&self) -> &'static str {
        match self {
            Coin::Btc => "btc",
            Coin::Tbtc => "tbtc",
            Coin::Rbtc => "rbtc",
            Coin::Ltc => "ltc",
            Coin::Tltc => "tltc",
            Coin::Eth => "eth",
            Coin::Sepeth => "sepeth",
            Coin::Erc20(token) => token.code,
        }
    }

    /// Human readable name, used to build default account names.
    pub fn name(&self) -> &'static str {
        match self {
            Coin::Btc => "Bitcoin",
            Coin::Tbtc => "Bitcoin Testnet",
            Coin::Rbtc => "Bitcoin Regtest",
            Coin::Ltc => "Litecoin",
            Coin::Tltc => "Litecoin Testnet",
            Coin::Eth => "Ethereum",
            Coin::Sepeth => "Ethereum Sepolia",
            Coin::Erc20(token) => token.name,
        }
    }

    /// Ticker used for rates lookups.
    pub fn unit(&self) -> &'static str {
        match self {
            Coin::Btc | Coin::Rbtc => "BTC",
            Coin::Tbtc => "TBTC",
            Coin::Ltc => "LTC",
            Coin::Tltc => "TLTC",
            Coin::Eth => "ETH",
            Coin::Sepeth => "SEPETH",
            Coin::Erc20(token) => token.unit,
        }
    }

    pub fn network(&self) -> Network {
        match self {
            Coin::Btc | Coin::Ltc | Coin::Eth | Coin::Erc20(_) => Network::Mainnet,
            Coin::Tbtc | Coin::Tltc | Coin::Sepeth => Network::Testnet,
            Coin::Rbtc => Network::Regtest,
        }
    }

    /// Number of decimals of the smallest unit.
    pub fn decimals(&self) -> u32 {
        match self {
            Coin::Btc | Coin::Tbtc | Coin::Rbtc | Coin::Ltc | Coin::Tltc => 8,
            Coin::Eth | Coin::Sepeth => 18,
            Coin::Erc20(token) => token.decimals,
        }
    }

    /// UTXO chains sharing the Bitcoin script model.
    pub fn is_btc_family(&self) -> bool {
        matches!(
            self,
            Coin::Btc | Coin::Tbtc | Coin::Rbtc | Coin::Ltc | Coin::Tltc
        )
    }

    /// Bitcoin proper (any network), as opposed to Litecoin.
    pub fn is_bitcoin(&self) -> bool {
        matches!(self, Coin::Btc | Coin::Tbtc | Coin::Rbtc)
    }

    /// Account-model chains, including tokens.
    pub fn is_eth_family(&self) -> bool {
        matches!(self, Coin::Eth | Coin::Sepeth | Coin::Erc20(_))
    }

    pub fn is_erc20(&self) -> bool {
        matches!(self, Coin::Erc20(_))
    }

    /// Ethereum chain ID.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Coin::Eth | Coin::Erc20(_) => Some(1),
            Coin::Sepeth => Some(11_155_111),
            _ => None,
        }
    }

    /// BIP44 coin type used in key paths.
    pub fn bip44_coin_type(&self) -> u32 {
        match self {
            Coin::Btc => 0,
            Coin::Ltc => 2,
            Coin::Eth | Coin::Erc20(_) => 60,
            Coin::Tbtc | Coin::Rbtc | Coin::Tltc | Coin::Sepeth => 1,
        }
    }

    /// Whether hidden accounts are added automatically for scanning.
    ///
    /// Ethereum is excluded as its default backend is rate limited.
    pub fn supports_discovery(&self) -> bool {
        self.is_btc_family()
    }

    /// Rank used to order accounts by coin.
    pub fn sort_rank(&self) -> u64 {
        match self {
            Coin::Btc => 0,
            Coin::Tbtc => 1,
            Coin::Rbtc => 2,
            Coin::Ltc => 3,
            Coin::Tltc => 4,
            // Ethereum family grouped by chain, mainnet first.
            Coin::Eth | Coin::Erc20(_) => 100,
            Coin::Sepeth => 101,
        }
    }

    /// Format a smallest-unit amount as a decimal string without trailing zeros.
    pub fn format_amount(&self, amount: &BigUint) -> String {
        format_units(amount, self.decimals())
    }

    /// Parse a token code into an ERC20 coin.
    pub fn from_erc20_code(code: &str) -> SigningResult<Coin> {
        erc20_token(code)
            .map(Coin::Erc20)
            .ok_or_else(|| SigningError::UnknownCoin(code.to_string()))
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Coin {
    type Err = SigningError;

    fn from_str(s: &str) -> SigningResult<Self> {
        if let Some(coin) = Coin::BASE.iter().find(|coin| coin.code() == s) {
            return Ok(*coin);
        }
        if s.starts_with(ERC20_PREFIX) {
            return Coin::from_erc20_code(s);
        }
        Err(SigningError::UnknownCoin(s.to_string()))
    }
}

impl Serialize for Coin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Coin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// Render `amount / 10^decimals`.
pub fn format_units(amount: &BigUint, decimals: u32) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }
    let digits = amount.to_str_radix(10);
    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}
