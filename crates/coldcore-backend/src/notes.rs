//! Notes export and import in BIP-329 label format.
//!
//! One JSON object per line. `xpub` entries carry account names, `tx` entries
//! transaction notes. Entries written by this backend carry a `bitboxapp`
//! extension naming the account, so they can be matched without a sync.

use crate::{Backend, BackendError, BackendResult};
use coldcore_accounts::{LiveAccount, MAX_NOTE_LEN, SUBJECT_ACCOUNTS};
use coldcore_signing::{AccountCode, XPub};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const TYPE_TX: &str = "tx";
const TYPE_XPUB: &str = "xpub";

/// Suggested file name for exports.
pub const NOTES_EXPORT_FILENAME: &str = "notes.jsonl";

/// Account an entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitBoxAppExtension {
    pub coin_code: String,
    pub code: AccountCode,
}

/// One line of a BIP-329 file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bip329Entry {
    /// `tx`, `xpub`, or another BIP-329 type, which is ignored.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitboxapp: Option<BitBoxAppExtension>,
}

/// What an import changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesImportResult {
    pub account_count: usize,
    pub transaction_count: usize,
}

/// Cut `label` to at most `max` bytes without splitting a character.
fn truncate_label(label: &str, max: usize) -> &str {
    if label.len() <= max {
        return label;
    }
    let mut end = max;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    &label[..end]
}

/// Parse every line; any invalid line fails the whole import.
pub fn parse_bip329(data: &[u8]) -> BackendResult<Vec<Bip329Entry>> {
    let text = std::str::from_utf8(data).map_err(|e| BackendError::InvalidNotes {
        line: 0,
        reason: e.to_string(),
    })?;
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|e| BackendError::InvalidNotes {
            line: index + 1,
            reason: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

impl Backend {
    /// Export names and notes of all loaded, non-hidden accounts.
    ///
    /// Accounts with a fatal error are skipped.
    pub fn export_notes(&self) -> BackendResult<String> {
        let mut out = String::new();
        for account in self.accounts() {
            let config = account.config();
            if config.hidden_because_unused || account.fatal_error() {
                continue;
            }
            let extension = BitBoxAppExtension {
                coin_code: config.coin.code().to_string(),
                code: config.code.clone(),
            };
            let mut entries = Vec::new();
            if !config.is_erc20() {
                for configuration in config.configurations.iter() {
                    entries.push(Bip329Entry {
                        kind: TYPE_XPUB.to_string(),
                        reference: configuration.xpub().to_string(),
                        label: config.name.clone(),
                        bitboxapp: Some(extension.clone()),
                    });
                }
            }
            for (internal_id, note) in account.notes().data().transactions {
                entries.push(Bip329Entry {
                    kind: TYPE_TX.to_string(),
                    reference: internal_id,
                    label: note,
                    bitboxapp: Some(extension.clone()),
                });
            }
            for entry in entries {
                out.push_str(&serde_json::to_string(&entry)?);
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Export to a file chosen by the user. `None` if the user canceled.
    #[instrument(skip(self))]
    pub fn export_notes_to_file(&self) -> BackendResult<Option<PathBuf>> {
        let Some(path) = self
            .collaborators
            .environment
            .get_save_filename(NOTES_EXPORT_FILENAME)
        else {
            return Ok(None);
        };
        let exported = self.export_notes()?;
        std::fs::write(&path, exported)?;
        info!(?path, "Exported notes");
        Ok(Some(path))
    }

    /// Import names and notes.
    ///
    /// Account names are matched by account code or xpub; hidden and ERC20
    /// accounts are never renamed. Transaction notes are matched by account
    /// code or by searching the transactions of every account.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn import_notes(&self, data: &[u8]) -> BackendResult<NotesImportResult> {
        let entries = parse_bip329(data)?;
        let accounts = self.accounts();
        let mut result = NotesImportResult::default();
        let mut renames: BTreeMap<AccountCode, String> = BTreeMap::new();

        for entry in &entries {
            let reference = entry.reference.trim();
            if reference.is_empty() || entry.label.trim().is_empty() {
                continue;
            }
            let label = truncate_label(&entry.label, MAX_NOTE_LEN);
            match entry.kind.as_str() {
                TYPE_XPUB => {
                    let code = match &entry.bitboxapp {
                        Some(extension) => Some(extension.code.clone()),
                        None => self
                            .config
                            .with_accounts(|cfg| cfg.lookup_by_xpub(&XPub::from(reference))),
                    };
                    let Some(code) = code else {
                        continue;
                    };
                    if code.is_erc20() {
                        continue;
                    }
                    let renamable = self.config.with_accounts(|cfg| {
                        cfg.lookup(&code).map_or(false, |account| {
                            !account.hidden_because_unused
                                && entry
                                    .bitboxapp
                                    .as_ref()
                                    .map_or(true, |e| e.coin_code == account.coin_code)
                        })
                    });
                    if renamable {
                        renames.insert(code, label.to_string());
                    }
                }
                TYPE_TX => {
                    let account = match &entry.bitboxapp {
                        Some(extension) => accounts
                            .iter()
                            .find(|a| a.code() == extension.code)
                            .cloned(),
                        None => find_account_by_transaction(&accounts, reference).await,
                    };
                    let Some(account) = account else {
                        debug!(reference, "No account for transaction note");
                        continue;
                    };
                    if account.notes().set_tx_note(reference, label)? {
                        result.transaction_count += 1;
                    }
                }
                other => debug!(kind = other, "Ignoring label type"),
            }
        }

        if !renames.is_empty() {
            let state = self.state.read();
            let renamed = self.config.modify_accounts(|cfg| {
                let mut renamed = Vec::new();
                for (code, name) in &renames {
                    if let Some(account) = cfg.lookup_mut(code) {
                        if &account.name != name {
                            account.name = name.clone();
                            renamed.push(code.clone());
                        }
                    }
                }
                Ok::<_, BackendError>(renamed)
            })?;
            for code in &renamed {
                if let Some(account) = state.accounts.iter().find(|a| &a.code() == code) {
                    account.set_name(&renames[code]);
                }
            }
            result.account_count = renamed.len();
        }

        info!(
            accounts = result.account_count,
            transactions = result.transaction_count,
            "Imported notes"
        );
        self.events.reload(SUBJECT_ACCOUNTS);
        Ok(result)
    }
}

/// Account whose transactions include `internal_id`.
async fn find_account_by_transaction(
    accounts: &[Arc<LiveAccount>],
    internal_id: &str,
) -> Option<Arc<LiveAccount>> {
    for account in accounts {
        if account.initialize().await.is_err() {
            continue;
        }
        match account.backend().transactions().await {
            Ok(transactions) if transactions.iter().any(|tx| tx.internal_id == internal_id) => {
                return Some(account.clone());
            }
            Ok(_) => {}
            Err(e) => warn!(code = %account.code(), error = %e, "Could not list transactions"),
        }
    }
    None
}
