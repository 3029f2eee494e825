//! Schema migrations applied on every load.
//!
//! Each migration returns whether it changed anything. The pipeline is rerun
//! until no migration reports a change, so migrations must be idempotent.

use crate::{AccountsConfig, AppConfig};
use coldcore_signing::LEGACY_SAI_TOKEN;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};

type Migration<T> = (&'static str, fn(&mut T) -> bool);

/// Upper bound on pipeline passes.
const MAX_PASSES: usize = 16;

const ACCOUNTS_MIGRATIONS: &[Migration<AccountsConfig>] = &[
    ("remove-legacy-sai-token", remove_legacy_sai_token),
    ("dedupe-active-tokens", dedupe_active_tokens),
];

const APP_MIGRATIONS: &[Migration<AppConfig>] = &[("lift-user-language", lift_user_language)];

fn run<T>(target: &mut T, migrations: &[Migration<T>]) -> bool {
    let mut changed = false;
    for _ in 0..MAX_PASSES {
        let mut pass_changed = false;
        for (name, migration) in migrations {
            if migration(target) {
                info!(migration = *name, "Applied config migration");
                pass_changed = true;
            }
        }
        if !pass_changed {
            return changed;
        }
        changed = true;
    }
    warn!("Config migrations did not reach a fixed point");
    changed
}

/// Migrate the accounts catalogue. Returns true if anything changed.
pub fn migrate_accounts(cfg: &mut AccountsConfig) -> bool {
    run(cfg, ACCOUNTS_MIGRATIONS)
}

/// Migrate the app settings. Returns true if anything changed.
pub fn migrate_app(cfg: &mut AppConfig) -> bool {
    run(cfg, APP_MIGRATIONS)
}

/// The Sai token was retired in favour of Dai.
fn remove_legacy_sai_token(cfg: &mut AccountsConfig) -> bool {
    let mut changed = false;
    for account in &mut cfg.accounts {
        let before = account.active_tokens.len();
        account.active_tokens.retain(|token| token != LEGACY_SAI_TOKEN);
        changed |= account.active_tokens.len() != before;
    }
    changed
}

/// Older versions could store a token twice; keep the first occurrence.
fn dedupe_active_tokens(cfg: &mut AccountsConfig) -> bool {
    let mut changed = false;
    for account in &mut cfg.accounts {
        let before = account.active_tokens.len();
        let mut seen = HashSet::with_capacity(before);
        account.active_tokens.retain(|token| seen.insert(token.clone()));
        changed |= account.active_tokens.len() != before;
    }
    changed
}

/// `userLanguage` used to live in the frontend blob.
fn lift_user_language(cfg: &mut AppConfig) -> bool {
    let Value::Object(frontend) = &mut cfg.frontend else {
        return false;
    };
    let Some(value) = frontend.remove("userLanguage") else {
        return false;
    };
    if let Value::String(language) = value {
        if cfg.backend.user_language.is_empty() {
            cfg.backend.user_language = language;
        }
    }
    true
}
