//! AOPP: address ownership proof protocol.
//!
//! A request arrives as an `aopp:?v=0&msg=..&asset=..&format=..&callback=..`
//! URI. The user approves, picks an account, the keystore signs `msg` with an
//! unused receive address and the signature is posted to `callback`.
//!
//! Every transition emits an `aopp` replace event with the full snapshot.
//! Each request gets a flow id; async steps re-check it before writing state,
//! so a cancel or a newer request wins over a stale flow.

use crate::Backend;
use base64::Engine;
use coldcore_accounts::{AccountConfig, LiveAccount, SUBJECT_AOPP};
use coldcore_keystore::Keystore;
use coldcore_signing::{AccountCode, Coin, ScriptType};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// AOPP protocol version understood.
const AOPP_VERSION: &str = "0";

/// AOPP flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AoppState {
    Error,
    #[default]
    Inactive,
    UserApproval,
    AwaitingKeystore,
    ChoosingAccount,
    Syncing,
    Signing,
    Success,
}

/// Why an AOPP flow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AoppErrorCode {
    #[serde(rename = "aoppUnknown")]
    Unknown,
    #[serde(rename = "aoppVersion")]
    Version,
    #[serde(rename = "aoppInvalidRequest")]
    InvalidRequest,
    #[serde(rename = "aoppNoAccounts")]
    NoAccounts,
    #[serde(rename = "aoppUnsupportedAsset")]
    UnsupportedAsset,
    #[serde(rename = "aoppUnsupportedFormat")]
    UnsupportedFormat,
    #[serde(rename = "aoppUnsupportedKeystore")]
    UnsupportedKeystore,
    #[serde(rename = "aoppSigningAborted")]
    SigningAborted,
    #[serde(rename = "aoppCallback")]
    Callback,
}

/// An account the user can choose from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AoppAccount {
    pub name: String,
    pub code: AccountCode,
}

/// Requested address format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AoppFormat {
    #[default]
    Any,
    Script(ScriptType),
    /// Unknown format, no account can match.
    Unsupported,
}

impl AoppFormat {
    fn parse(format: Option<&str>) -> Self {
        match format {
            None | Some("any") => AoppFormat::Any,
            Some("p2wpkh") => AoppFormat::Script(ScriptType::P2wpkh),
            Some("p2sh") => AoppFormat::Script(ScriptType::P2wpkhP2sh),
            Some("p2pkh") => AoppFormat::Script(ScriptType::P2pkh),
            Some(_) => AoppFormat::Unsupported,
        }
    }

    fn accepts(&self, account: &AccountConfig) -> bool {
        if !account.coin.is_btc_family() {
            return true;
        }
        match self {
            AoppFormat::Any => true,
            AoppFormat::Script(script_type) => {
                account.configurations.find_script_type(*script_type).is_some()
            }
            AoppFormat::Unsupported => false,
        }
    }
}

/// Snapshot of the AOPP flow, as sent to the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aopp {
    pub state: AoppState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<AoppErrorCode>,
    /// Candidate accounts while choosing.
    pub accounts: Vec<AoppAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_code: Option<AccountCode>,
    pub address: String,
    pub address_id: String,
    pub callback: String,
    pub message: String,
    #[serde(skip)]
    pub(crate) coin: Option<Coin>,
    #[serde(skip)]
    pub(crate) format: AoppFormat,
    #[serde(skip)]
    pub(crate) xpub_required: bool,
    #[serde(skip)]
    pub(crate) flow: u64,
}

impl Aopp {
    /// Back to inactive, starting a new flow.
    fn reset(&mut self) {
        *self = Aopp {
            flow: self.flow + 1,
            ..Default::default()
        };
    }

    fn fail(&mut self, code: AoppErrorCode) {
        self.state = AoppState::Error;
        self.error_code = Some(code);
    }

    /// Fill the request fields from `uri`. The callback is kept as soon as it
    /// is known valid so that later errors still show it.
    fn parse_request(&mut self, uri: &str) -> Result<(), AoppErrorCode> {
        let url = Url::parse(uri).map_err(|_| AoppErrorCode::InvalidRequest)?;
        if url.scheme() != "aopp" {
            return Err(AoppErrorCode::InvalidRequest);
        }
        let param = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };

        if param("v").as_deref() != Some(AOPP_VERSION) {
            return Err(AoppErrorCode::Version);
        }
        let callback = param("callback").ok_or(AoppErrorCode::InvalidRequest)?;
        Url::parse(&callback).map_err(|_| AoppErrorCode::InvalidRequest)?;
        self.callback = callback;

        let asset = param("asset").ok_or(AoppErrorCode::InvalidRequest)?;
        self.coin = Some(match asset.to_ascii_lowercase().as_str() {
            "btc" => Coin::Btc,
            "eth" => Coin::Eth,
            "rbtc" => Coin::Rbtc,
            _ => return Err(AoppErrorCode::UnsupportedAsset),
        });
        self.message = param("msg").ok_or(AoppErrorCode::InvalidRequest)?;
        self.format = AoppFormat::parse(param("format").as_deref());
        self.xpub_required = matches!(param("xpub_required").as_deref(), Some("1" | "true"));
        Ok(())
    }
}

/// Body posted to the callback.
#[derive(Debug, Serialize)]
struct CallbackBody<'a> {
    version: u32,
    address: &'a str,
    /// Base64 of the keystore signature.
    signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    xpub: Option<String>,
}

impl Backend {
    /// Current AOPP snapshot.
    pub fn aopp(&self) -> Aopp {
        self.state.read().aopp.clone()
    }

    fn notify_aopp(&self, snapshot: &Aopp) {
        match serde_json::to_value(snapshot) {
            Ok(object) => self.events.replace(SUBJECT_AOPP, object),
            Err(e) => warn!(error = %e, "Could not serialize AOPP state"),
        }
    }

    /// Apply `f` if flow `flow` is still current, then emit the snapshot.
    /// Returns false for a stale flow.
    fn aopp_update(&self, flow: u64, f: impl FnOnce(&mut Aopp)) -> bool {
        let snapshot = {
            let mut state = self.state.write();
            if state.aopp.flow != flow {
                debug!(flow, "Ignoring stale AOPP flow");
                return false;
            }
            f(&mut state.aopp);
            state.aopp.clone()
        };
        self.notify_aopp(&snapshot);
        true
    }

    fn aopp_fail(&self, flow: u64, code: AoppErrorCode) {
        warn!(?code, "AOPP failed");
        self.aopp_update(flow, |aopp| aopp.fail(code));
    }

    /// Start a flow from an `aopp:` URI, replacing any running flow.
    #[instrument(skip(self))]
    pub fn handle_aopp_uri(&self, uri: &str) {
        let snapshot = {
            let mut state = self.state.write();
            let aopp = &mut state.aopp;
            aopp.reset();
            match aopp.parse_request(uri) {
                Ok(()) => aopp.state = AoppState::UserApproval,
                Err(code) => aopp.fail(code),
            }
            aopp.clone()
        };
        info!(state = ?snapshot.state, "AOPP request");
        self.notify_aopp(&snapshot);
    }

    /// The user approved the request.
    pub async fn aopp_approve(&self) {
        let (flow, keystore) = {
            let mut state = self.state.write();
            if state.aopp.state != AoppState::UserApproval {
                return;
            }
            match state.keystore.clone() {
                Some(keystore) => (state.aopp.flow, keystore),
                None => {
                    state.aopp.state = AoppState::AwaitingKeystore;
                    let snapshot = state.aopp.clone();
                    drop(state);
                    self.notify_aopp(&snapshot);
                    return;
                }
            }
        };
        self.aopp_keystore_ready(flow, keystore).await;
    }

    /// Called after a keystore registered.
    pub(crate) async fn aopp_keystore_registered(&self) {
        let (flow, keystore) = {
            let state = self.state.read();
            if state.aopp.state != AoppState::AwaitingKeystore {
                return;
            }
            match state.keystore.clone() {
                Some(keystore) => (state.aopp.flow, keystore),
                None => return,
            }
        };
        self.aopp_keystore_ready(flow, keystore).await;
    }

    /// Collect candidate accounts; choose automatically if there is only one.
    async fn aopp_keystore_ready(&self, flow: u64, keystore: Arc<dyn Keystore>) {
        let (snapshot, chosen) = {
            let mut state = self.state.write();
            if state.aopp.flow != flow {
                return;
            }
            let Some(coin) = state.aopp.coin else {
                return;
            };
            let fingerprint = keystore.root_fingerprint();
            let format = state.aopp.format;

            let mut filtered = false;
            let mut candidates = Vec::new();
            if keystore.can_sign_message(coin) {
                for account in &state.accounts {
                    let config = account.config();
                    if config.inactive
                        || config.hidden_because_unused
                        || config.root_fingerprint != fingerprint
                        || config.coin != coin
                    {
                        continue;
                    }
                    if !format.accepts(&config) {
                        filtered = true;
                        continue;
                    }
                    candidates.push(AoppAccount {
                        name: config.name,
                        code: config.code,
                    });
                }
            }

            let aopp = &mut state.aopp;
            let mut chosen = None;
            if !keystore.can_sign_message(coin) {
                aopp.fail(AoppErrorCode::UnsupportedKeystore);
            } else if candidates.is_empty() {
                aopp.fail(if filtered {
                    AoppErrorCode::UnsupportedFormat
                } else {
                    AoppErrorCode::NoAccounts
                });
            } else {
                if candidates.len() == 1 {
                    chosen = Some(candidates[0].code.clone());
                }
                aopp.accounts = candidates;
                aopp.state = AoppState::ChoosingAccount;
            }
            (aopp.clone(), chosen)
        };
        self.notify_aopp(&snapshot);
        if let Some(code) = chosen {
            self.aopp_choose_account(&code).await;
        }
    }

    /// Use `code` for the proof: sync it, sign with an unused address and
    /// post the result.
    #[instrument(skip(self))]
    pub async fn aopp_choose_account(&self, code: &AccountCode) {
        let prepared = {
            let mut state = self.state.write();
            if state.aopp.state != AoppState::ChoosingAccount
                || !state.aopp.accounts.iter().any(|a| &a.code == code)
            {
                return;
            }
            let account = state.accounts.iter().find(|a| &a.code() == code).cloned();
            let keystore = state.keystore.clone();
            let aopp = &mut state.aopp;
            match (account, keystore) {
                (Some(account), Some(keystore)) => {
                    aopp.account_code = Some(code.clone());
                    aopp.state = AoppState::Syncing;
                    Ok((aopp.flow, account, keystore, aopp.clone()))
                }
                _ => {
                    aopp.fail(AoppErrorCode::Unknown);
                    Err(aopp.clone())
                }
            }
        };
        let (flow, account, keystore, snapshot) = match prepared {
            Ok(prepared) => prepared,
            Err(snapshot) => {
                self.notify_aopp(&snapshot);
                return;
            }
        };
        self.notify_aopp(&snapshot);

        if let Err(code) = self.aopp_sign(flow, &account, keystore.as_ref(), &snapshot).await {
            self.aopp_fail(flow, code);
        }
    }

    async fn aopp_sign(
        &self,
        flow: u64,
        account: &LiveAccount,
        keystore: &dyn Keystore,
        request: &Aopp,
    ) -> Result<(), AoppErrorCode> {
        let coin = request.coin.ok_or(AoppErrorCode::Unknown)?;

        account.initialize().await.map_err(|e| {
            warn!(error = %e, "AOPP account failed to initialize");
            AoppErrorCode::Unknown
        })?;
        account.wait_synced(self.options.aopp_sync_poll()).await;

        let lists = account.backend().unused_receive_addresses().await.map_err(|e| {
            warn!(error = %e, "Could not get receive addresses");
            AoppErrorCode::Unknown
        })?;
        let list = match request.format {
            AoppFormat::Script(script_type) => lists
                .iter()
                .find(|list| list.configuration.script_type() == Some(script_type)),
            _ => lists.first(),
        };
        let (configuration, address) = list
            .and_then(|list| list.addresses.first().map(|a| (&list.configuration, a)))
            .ok_or(AoppErrorCode::Unknown)?;

        let signing = self.aopp_update(flow, |aopp| {
            aopp.address = address.encoded.clone();
            aopp.address_id = address.id.clone();
            aopp.state = AoppState::Signing;
        });
        if !signing {
            return Ok(());
        }

        let message = request.message.as_bytes();
        let signature = match configuration.script_type() {
            Some(script_type) => {
                keystore
                    .sign_btc_message(message, &address.keypath, script_type, coin)
                    .await
            }
            None => keystore.sign_eth_message(message, &address.keypath).await,
        };
        let signature = signature.map_err(|e| {
            if e.is_user_abort() {
                AoppErrorCode::SigningAborted
            } else {
                warn!(error = %e, "AOPP signing failed");
                AoppErrorCode::Unknown
            }
        })?;

        if self.state.read().aopp.flow != flow {
            return Ok(());
        }
        let body = CallbackBody {
            version: 0,
            address: &address.encoded,
            signature: base64::engine::general_purpose::STANDARD.encode(&signature),
            xpub: request
                .xpub_required
                .then(|| configuration.xpub().to_string()),
        };
        let response = self
            .http
            .post(&request.callback)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "AOPP callback failed");
                AoppErrorCode::Callback
            })?;
        if response.status() != reqwest::StatusCode::NO_CONTENT {
            warn!(status = %response.status(), "AOPP callback rejected");
            return Err(AoppErrorCode::Callback);
        }

        info!(address = %address.encoded, "AOPP proof delivered");
        self.aopp_update(flow, |aopp| aopp.state = AoppState::Success);
        Ok(())
    }

    /// Abort the flow from any state.
    pub fn aopp_cancel(&self) {
        let snapshot = {
            let mut state = self.state.write();
            state.aopp.reset();
            state.aopp.clone()
        };
        self.notify_aopp(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> (Aopp, Result<(), AoppErrorCode>) {
        let mut aopp = Aopp::default();
        let result = aopp.parse_request(uri);
        (aopp, result)
    }

    #[test]
    fn test_parse_valid() {
        let (aopp, result) = parse(
            "aopp:?v=0&msg=message%20to%20sign&asset=btc&format=p2wpkh&callback=https://example.com/proofs/1",
        );
        assert_eq!(result, Ok(()));
        assert_eq!(aopp.message, "message to sign");
        assert_eq!(aopp.callback, "https://example.com/proofs/1");
        assert_eq!(aopp.coin, Some(Coin::Btc));
        assert_eq!(aopp.format, AoppFormat::Script(ScriptType::P2wpkh));
        assert!(!aopp.xpub_required);
    }

    #[test]
    fn test_parse_errors() {
        let cb = "callback=https://example.com";
        assert_eq!(parse("aopp:?v=1&msg=m&asset=btc").1, Err(AoppErrorCode::Version));
        assert_eq!(parse("aopp:?v=0&msg=m&asset=btc").1, Err(AoppErrorCode::InvalidRequest));
        assert_eq!(
            parse("aopp:?v=0&msg=m&asset=btc&callback=/relative").1,
            Err(AoppErrorCode::InvalidRequest)
        );
        let (aopp, result) = parse(&format!("aopp:?v=0&msg=m&asset=doge&{}", cb));
        assert_eq!(result, Err(AoppErrorCode::UnsupportedAsset));
        assert_eq!(aopp.callback, "https://example.com");
        assert_eq!(
            parse(&format!("aopp:?v=0&asset=btc&{}", cb)).1,
            Err(AoppErrorCode::InvalidRequest)
        );
        assert_eq!(parse("not a uri").1, Err(AoppErrorCode::InvalidRequest));
    }

    #[test]
    fn test_parse_format() {
        let (aopp, _) = parse("aopp:?v=0&msg=m&asset=btc&callback=https://x.com&format=p2sh");
        assert_eq!(aopp.format, AoppFormat::Script(ScriptType::P2wpkhP2sh));
        let (aopp, _) = parse("aopp:?v=0&msg=m&asset=btc&callback=https://x.com");
        assert_eq!(aopp.format, AoppFormat::Any);
        let (aopp, _) = parse("aopp:?v=0&msg=m&asset=eth&callback=https://x.com&format=p2xyz");
        assert_eq!(aopp.format, AoppFormat::Unsupported);
        let (aopp, _) =
            parse("aopp:?v=0&msg=m&asset=btc&callback=https://x.com&xpub_required=1");
        assert!(aopp.xpub_required);
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut aopp = Aopp::default();
        aopp.fail(AoppErrorCode::NoAccounts);
        let value = serde_json::to_value(&aopp).unwrap();
        assert_eq!(value["state"], "error");
        assert_eq!(value["errorCode"], "aoppNoAccounts");
        assert!(value.get("flow").is_none());
        assert!(value.get("accountCode").is_none());
    }

    #[test]
    fn test_reset_starts_new_flow() {
        let mut aopp = Aopp::default();
        aopp.state = AoppState::Signing;
        aopp.reset();
        assert_eq!(aopp.state, AoppState::Inactive);
        assert_eq!(aopp.flow, 1);
    }
}
