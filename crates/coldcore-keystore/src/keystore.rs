//! Keystore capability.

use crate::KeystoreResult;
use async_trait::async_trait;
use coldcore_signing::{AbsoluteKeypath, Coin, RootFingerprint, ScriptType, XPub};

/// A hardware signer as seen by the backend.
///
/// Transport, pairing and firmware details stay behind this trait. Calls that
/// need user confirmation on the device may take minutes.
#[async_trait]
pub trait Keystore: Send + Sync {
    /// Fingerprint of the master key.
    fn root_fingerprint(&self) -> RootFingerprint;

    /// Device name shown to the user.
    fn name(&self) -> String;

    fn supports_coin(&self, coin: Coin) -> bool;

    /// Whether an account of `coin` with the given script type can be used.
    ///
    /// `script_type` is `None` for Ethereum-family coins.
    fn supports_account(&self, coin: Coin, script_type: Option<ScriptType>) -> bool;

    /// Whether more than one account per coin is supported.
    fn supports_multiple_accounts(&self) -> bool;

    /// Whether messages can be signed for `coin`.
    fn can_sign_message(&self, coin: Coin) -> bool;

    async fn extended_public_key(&self, coin: Coin, keypath: &AbsoluteKeypath)
        -> KeystoreResult<XPub>;

    /// Xpubs of several Bitcoin-family key paths, in request order.
    async fn btc_xpubs(&self, coin: Coin, keypaths: &[AbsoluteKeypath])
        -> KeystoreResult<Vec<XPub>>;

    async fn sign_btc_message(
        &self,
        message: &[u8],
        keypath: &AbsoluteKeypath,
        script_type: ScriptType,
        coin: Coin,
    ) -> KeystoreResult<Vec<u8>>;

    async fn sign_eth_message(&self, message: &[u8], keypath: &AbsoluteKeypath)
        -> KeystoreResult<Vec<u8>>;

    /// Release the device.
    fn close(&self) {}
}
