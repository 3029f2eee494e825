//! Absolute BIP32 key paths.

use crate::{SigningError, SigningResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Hardened derivation offset.
pub const HARDENED: u32 = 0x8000_0000;

/// One element of a key path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyNode {
    pub index: u32,
    pub hardened: bool,
}

impl KeyNode {
    pub fn hardened(index: u32) -> Self {
        Self {
            index,
            hardened: true,
        }
    }

    pub fn normal(index: u32) -> Self {
        Self {
            index,
            hardened: false,
        }
    }

    /// Index including the hardened offset.
    pub fn to_u32(self) -> u32 {
        if self.hardened {
            self.index | HARDENED
        } else {
            self.index
        }
    }
}

impl fmt::Display for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Key path starting at the master key, e.g. `m/84'/0'/0'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AbsoluteKeypath(Vec<KeyNode>);

impl AbsoluteKeypath {
    pub fn new(nodes: Vec<KeyNode>) -> Self {
        Self(nodes)
    }

    pub fn nodes(&self) -> &[KeyNode] {
        &self.0
    }

    /// Append a child node.
    pub fn child(&self, index: u32, hardened: bool) -> Self {
        let mut nodes = self.0.clone();
        nodes.push(KeyNode { index, hardened });
        Self(nodes)
    }

    pub fn to_u32_vec(&self) -> Vec<u32> {
        self.0.iter().map(|node| node.to_u32()).collect()
    }

    /// Account number encoded in the path.
    ///
    /// BIP44-style paths (`m/purpose'/coin'/account'`) carry it at index 2;
    /// Ethereum paths (`m/44'/60'/0'/0/n`) carry it in the last element.
    pub fn account_number(&self) -> SigningResult<u16> {
        let node = match self.0.len() {
            3 => self.0[2],
            5 => self.0[4],
            _ => return Err(SigningError::NoAccountNumber(self.to_string())),
        };
        u16::try_from(node.index).map_err(|_| SigningError::NoAccountNumber(self.to_string()))
    }
}

impl fmt::Display for AbsoluteKeypath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for node in &self.0 {
            write!(f, "/{}", node)?;
        }
        Ok(())
    }
}

impl FromStr for AbsoluteKeypath {
    type Err = SigningError;

    fn from_str(s: &str) -> SigningResult<Self> {
        let invalid = |reason: &str| SigningError::InvalidKeypath {
            path: s.to_string(),
            reason: reason.to_string(),
        };
        let rest = s
            .trim()
            .strip_prefix('m')
            .ok_or_else(|| invalid("missing m/ prefix"))?;
        let mut nodes = Vec::new();
        for split in rest.split('/') {
            let split = split.trim();
            if split.is_empty() {
                continue;
            }
            let (digits, hardened) = match split.strip_suffix('\'') {
                Some(digits) => (digits.trim(), true),
                None => (split, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| invalid("a path node is not a number"))?;
            if index >= HARDENED {
                return Err(invalid("path index out of range"));
            }
            nodes.push(KeyNode { index, hardened });
        }
        Ok(Self(nodes))
    }
}

impl Serialize for AbsoluteKeypath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AbsoluteKeypath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let path = String::deserialize(deserializer)?;
        path.parse().map_err(serde::de::Error::custom)
    }
}
