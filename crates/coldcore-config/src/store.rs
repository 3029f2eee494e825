//! On-disk catalogue with atomic read-modify-write.

use crate::migrations::{migrate_accounts, migrate_app};
use crate::{AccountsConfig, AppConfig, ConfigResult};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Accounts catalogue file name.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// App settings file name.
pub const APP_FILE: &str = "app.json";

/// Write `bytes` to `path` atomically (temp file in the same directory, then rename).
///
/// The file is readable by the owner only where the platform supports it.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> ConfigResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as indented JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> ConfigResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_file_atomic(path, &bytes)
}

/// Read a JSON file, returning `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> ConfigResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persisted configuration: the accounts catalogue and app settings.
///
/// Reads return snapshots. Writes go through [`Config::modify_accounts`] and
/// [`Config::modify_app`], which serialize on their own lock, run the
/// modification on a copy and only replace the in-memory value once the file
/// was written.
pub struct Config {
    dir: PathBuf,
    accounts: RwLock<AccountsConfig>,
    app: RwLock<AppConfig>,
    /// Serializes catalogue writers.
    accounts_write: Mutex<()>,
    app_write: Mutex<()>,
}

impl Config {
    /// Load both files from `dir`, falling back to defaults.
    ///
    /// Migrations run on every load; migrated state is written back.
    pub fn load(dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let accounts_path = dir.join(ACCOUNTS_FILE);
        let mut accounts: AccountsConfig = read_json(&accounts_path)?.unwrap_or_default();
        if migrate_accounts(&mut accounts) {
            info!(path = ?accounts_path, "Writing migrated accounts config");
            write_json_atomic(&accounts_path, &accounts)?;
        }

        let app_path = dir.join(APP_FILE);
        let mut app: AppConfig = read_json(&app_path)?.unwrap_or_default();
        if migrate_app(&mut app) {
            info!(path = ?app_path, "Writing migrated app config");
            write_json_atomic(&app_path, &app)?;
        }

        debug!(
            accounts = accounts.accounts.len(),
            keystores = accounts.keystores.len(),
            "Loaded config"
        );

        Ok(Self {
            dir,
            accounts: RwLock::new(accounts),
            app: RwLock::new(app),
            accounts_write: Mutex::new(()),
            app_write: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.dir.join(ACCOUNTS_FILE)
    }

    pub fn app_path(&self) -> PathBuf {
        self.dir.join(APP_FILE)
    }

    /// Snapshot of the accounts catalogue.
    pub fn accounts(&self) -> AccountsConfig {
        self.accounts.read().clone()
    }

    /// Run a read-only closure on the catalogue without cloning it.
    pub fn with_accounts<T>(&self, f: impl FnOnce(&AccountsConfig) -> T) -> T {
        f(&self.accounts.read())
    }

    /// Snapshot of the app settings.
    pub fn app(&self) -> AppConfig {
        self.app.read().clone()
    }

    /// Modify the accounts catalogue.
    ///
    /// `f` runs on a copy. If it fails, or writing the file fails, neither disk
    /// nor memory change.
    pub fn modify_accounts<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AccountsConfig) -> Result<T, E>,
        E: From<crate::ConfigError>,
    {
        let _guard = self.accounts_write.lock();
        let mut copy = self.accounts.read().clone();
        let result = f(&mut copy)?;
        write_json_atomic(&self.accounts_path(), &copy)?;
        *self.accounts.write() = copy;
        Ok(result)
    }

    /// Modify the app settings, same contract as [`Config::modify_accounts`].
    pub fn modify_app<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AppConfig) -> Result<T, E>,
        E: From<crate::ConfigError>,
    {
        let _guard = self.app_write.lock();
        let mut copy = self.app.read().clone();
        let result = f(&mut copy)?;
        write_json_atomic(&self.app_path(), &copy)?;
        *self.app.write() = copy;
        Ok(result)
    }
}
