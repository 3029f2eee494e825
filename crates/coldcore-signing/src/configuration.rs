//! Signing configurations.
//!
//! A signing configuration binds a keystore (by root fingerprint) to an
//! account-level key path and extended public key. Bitcoin-family
//! configurations additionally carry the output script type.

use crate::{AbsoluteKeypath, SigningError, SigningResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// First four bytes of the hash160 of the master public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RootFingerprint(pub [u8; 4]);

impl RootFingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RootFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for RootFingerprint {
    type Err = SigningError;

    fn from_str(s: &str) -> SigningResult<Self> {
        let bytes = hex::decode(s).map_err(|_| SigningError::InvalidFingerprint(s.to_string()))?;
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidFingerprint(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for RootFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RootFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Serialized extended public key (xpub/tpub/zpub...).
///
/// Kept opaque: derivation is the keystore's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct XPub(pub String);

impl XPub {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for XPub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for XPub {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Bitcoin output script type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    /// Native segwit.
    #[serde(rename = "p2wpkh")]
    P2wpkh,
    /// Taproot.
    #[serde(rename = "p2tr")]
    P2tr,
    /// Segwit wrapped in P2SH.
    #[serde(rename = "p2wpkh-p2sh")]
    P2wpkhP2sh,
    /// Legacy.
    #[serde(rename = "p2pkh")]
    P2pkh,
}

impl ScriptType {
    /// BIP purpose field of the canonical key path.
    pub fn purpose(&self) -> u32 {
        match self {
            ScriptType::P2wpkh => 84,
            ScriptType::P2tr => 86,
            ScriptType::P2wpkhP2sh => 49,
            ScriptType::P2pkh => 44,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2tr => "p2tr",
            ScriptType::P2wpkhP2sh => "p2wpkh-p2sh",
            ScriptType::P2pkh => "p2pkh",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keystore, key path and xpub of one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub root_fingerprint: RootFingerprint,
    pub keypath: AbsoluteKeypath,
    pub xpub: XPub,
}

/// How an account's keys are derived and which script they pay to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SigningConfiguration {
    /// Single-sig Bitcoin-family configuration.
    #[serde(rename_all = "camelCase")]
    BitcoinSimple {
        script_type: ScriptType,
        key_info: KeyInfo,
    },
    /// Single-sig Ethereum-family configuration.
    #[serde(rename_all = "camelCase")]
    EthereumSimple { key_info: KeyInfo },
}

impl SigningConfiguration {
    pub fn bitcoin(
        script_type: ScriptType,
        root_fingerprint: RootFingerprint,
        keypath: AbsoluteKeypath,
        xpub: XPub,
    ) -> Self {
        SigningConfiguration::BitcoinSimple {
            script_type,
            key_info: KeyInfo {
                root_fingerprint,
                keypath,
                xpub,
            },
        }
    }

    pub fn ethereum(root_fingerprint: RootFingerprint, keypath: AbsoluteKeypath, xpub: XPub) -> Self {
        SigningConfiguration::EthereumSimple {
            key_info: KeyInfo {
                root_fingerprint,
                keypath,
                xpub,
            },
        }
    }

    pub fn key_info(&self) -> &KeyInfo {
        match self {
            SigningConfiguration::BitcoinSimple { key_info, .. } => key_info,
            SigningConfiguration::EthereumSimple { key_info } => key_info,
        }
    }

    pub fn root_fingerprint(&self) -> RootFingerprint {
        self.key_info().root_fingerprint
    }

    pub fn keypath(&self) -> &AbsoluteKeypath {
        &self.key_info().keypath
    }

    pub fn xpub(&self) -> &XPub {
        &self.key_info().xpub
    }

    /// Script type, for Bitcoin-family configurations.
    pub fn script_type(&self) -> Option<ScriptType> {
        match self {
            SigningConfiguration::BitcoinSimple { script_type, .. } => Some(*script_type),
            SigningConfiguration::EthereumSimple { .. } => None,
        }
    }

    pub fn account_number(&self) -> SigningResult<u16> {
        self.keypath().account_number()
    }
}

/// Ordered list of signing configurations of one account.
///
/// The first element is canonical for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningConfigurations(pub Vec<SigningConfiguration>);

impl SigningConfigurations {
    pub fn new(configurations: Vec<SigningConfiguration>) -> Self {
        Self(configurations)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SigningConfiguration> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&SigningConfiguration> {
        self.0.first()
    }

    pub fn push(&mut self, configuration: SigningConfiguration) {
        self.0.push(configuration);
    }

    /// Fingerprint of the owning keystore, taken from the canonical configuration.
    pub fn root_fingerprint(&self) -> SigningResult<RootFingerprint> {
        self.first()
            .map(|config| config.root_fingerprint())
            .ok_or(SigningError::NoConfigurations)
    }

    pub fn contains_root_fingerprint(&self, fingerprint: RootFingerprint) -> bool {
        self.iter()
            .any(|config| config.root_fingerprint() == fingerprint)
    }

    /// Account number of the canonical configuration.
    pub fn account_number(&self) -> SigningResult<u16> {
        self.first()
            .ok_or(SigningError::NoConfigurations)?
            .account_number()
    }

    /// Position of the configuration with the given script type.
    pub fn find_script_type(&self, script_type: ScriptType) -> Option<usize> {
        self.iter()
            .position(|config| config.script_type() == Some(script_type))
    }

    /// True if any xpub appears in both lists.
    pub fn shares_xpub_with(&self, other: &SigningConfigurations) -> bool {
        self.iter()
            .any(|ours| other.iter().any(|theirs| ours.xpub() == theirs.xpub()))
    }
}

impl<'a> IntoIterator for &'a SigningConfigurations {
    type Item = &'a SigningConfiguration;
    type IntoIter = std::slice::Iter<'a, SigningConfiguration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<SigningConfiguration> for SigningConfigurations {
    fn from_iter<I: IntoIterator<Item = SigningConfiguration>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
