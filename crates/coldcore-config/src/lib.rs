//! # coldcore-config
//!
//! Persisted state of the wallet backend.
//!
//! Two JSON files live in the data directory:
//! - `accounts.json`: accounts and known keystores ([`AccountsConfig`])
//! - `app.json`: typed backend settings plus an opaque frontend blob ([`AppConfig`])
//!
//! Both are written atomically with owner-only permissions. Schema migrations
//! run on every load.

mod accounts;
mod app;
mod error;
mod migrations;
mod store;

pub use accounts::{Account, AccountsConfig, Keystore};
pub use app::{AppConfig, BackendSettings, BITSURANCE_NOTIFY_KEY};
pub use error::{ConfigError, ConfigResult};
pub use migrations::{migrate_accounts, migrate_app};
pub use store::{
    read_json, write_file_atomic, write_json_atomic, Config, ACCOUNTS_FILE, APP_FILE,
};
