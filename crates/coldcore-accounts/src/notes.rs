//! Per-account transaction notes.

use crate::{AccountError, AccountResult};
use coldcore_config::{read_json, write_json_atomic};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maximum note length in bytes.
pub const MAX_NOTE_LEN: usize = 1024;

/// Notes file contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotesData {
    /// Notes keyed by transaction internal ID.
    #[serde(default)]
    pub transactions: BTreeMap<String, String>,
}

/// Notes of one account, backed by a JSON file.
pub struct Notes {
    path: PathBuf,
    data: RwLock<NotesData>,
}

impl Notes {
    /// Open the notes file, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> AccountResult<Self> {
        let path = path.into();
        let data: NotesData = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tx_note(&self, internal_id: &str) -> Option<String> {
        self.data.read().transactions.get(internal_id).cloned()
    }

    /// Snapshot of all notes.
    pub fn data(&self) -> NotesData {
        self.data.read().clone()
    }

    /// Set or clear (empty `note`) a transaction note. Returns whether it changed.
    pub fn set_tx_note(&self, internal_id: &str, note: &str) -> AccountResult<bool> {
        if note.len() > MAX_NOTE_LEN {
            return Err(AccountError::NoteTooLong {
                len: note.len(),
                max: MAX_NOTE_LEN,
            });
        }
        let mut data = self.data.write();
        let mut updated = data.clone();
        if note.is_empty() {
            updated.transactions.remove(internal_id);
        } else {
            updated
                .transactions
                .insert(internal_id.to_string(), note.to_string());
        }
        if updated == *data {
            return Ok(false);
        }
        write_json_atomic(&self.path, &updated)?;
        *data = updated;
        Ok(true)
    }
}
