//! Backend core: shared state, keystore lifecycle and catalogue writes.

use crate::aopp::Aopp;
use crate::{BackendError, BackendOptions, BackendResult, Collaborators};
use coldcore_accounts::{Event, EventBus, LiveAccount, SUBJECT_ACCOUNTS, SUBJECT_CONNECT_KEYSTORE};
use coldcore_config::{Account, AccountsConfig, Config};
use coldcore_keystore::{ConnectError, ConnectKeystore, Keystore};
use coldcore_signing::{
    default_account_name, default_key_paths, regular_account_code, AbsoluteKeypath, AccountCode,
    Coin, RootFingerprint, ScriptType, SigningConfiguration, SigningConfigurations,
};
use parking_lot::RwLock;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Mutable runtime state, guarded by one lock.
///
/// Lock order: this lock before the catalogue writer lock. Never held across
/// an `.await`.
pub(crate) struct State {
    pub accounts: Vec<Arc<LiveAccount>>,
    pub keystore: Option<Arc<dyn Keystore>>,
    pub aopp: Aopp,
}

/// The wallet backend.
pub struct Backend {
    pub(crate) options: BackendOptions,
    pub(crate) config: Config,
    pub(crate) state: RwLock<State>,
    pub(crate) connect: ConnectKeystore,
    /// Serializes discovery runs, which await the keystore between reading
    /// and writing the catalogue.
    pub(crate) discovery: tokio::sync::Mutex<()>,
    pub(crate) events: EventBus,
    pub(crate) collaborators: Collaborators,
    pub(crate) http: reqwest::Client,
    pub(crate) runtime: Handle,
    pub(crate) weak: Weak<Backend>,
}

impl Backend {
    /// Load the catalogue from `options.data_dir` and build the registry.
    ///
    /// Must be called from within a tokio runtime. Returns the backend and the
    /// receiving end of its event stream.
    pub fn new(
        options: BackendOptions,
        collaborators: Collaborators,
    ) -> BackendResult<(Arc<Self>, mpsc::UnboundedReceiver<Event>)> {
        let runtime = Handle::try_current().map_err(|_| BackendError::NoRuntime)?;
        let config = Config::load(&options.data_dir)?;
        let (events, rx) = EventBus::new();

        info!(
            data_dir = ?options.data_dir,
            network = %options.network,
            "Starting backend"
        );

        let backend = Arc::new_cyclic(|weak| Self {
            options,
            config,
            state: RwLock::new(State {
                accounts: Vec::new(),
                keystore: None,
                aopp: Aopp::default(),
            }),
            connect: ConnectKeystore::new(),
            discovery: tokio::sync::Mutex::new(()),
            events,
            collaborators,
            http: reqwest::Client::new(),
            runtime,
            weak: weak.clone(),
        });

        // Watch-only accounts are available without a keystore.
        backend.rebuild();
        Ok((backend, rx))
    }

    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The registered keystore, if any.
    pub fn keystore(&self) -> Option<Arc<dyn Keystore>> {
        self.state.read().keystore.clone()
    }

    pub(crate) fn notes_path(&self, code: &AccountCode) -> PathBuf {
        self.options
            .data_dir
            .join("notes")
            .join(format!("{}.json", code))
    }

    /// Register a newly connected keystore.
    ///
    /// Records the keystore, creates default accounts on first use, upgrades
    /// accounts to script types the keystore now supports, rebuilds the
    /// registry and resumes flows waiting for a keystore.
    #[instrument(skip(self, keystore), fields(fingerprint = %keystore.root_fingerprint()))]
    pub async fn register_keystore(&self, keystore: Arc<dyn Keystore>) -> BackendResult<()> {
        let fingerprint = keystore.root_fingerprint();
        info!(name = %keystore.name(), "Registering keystore");

        let previous = self.state.write().keystore.take();
        if let Some(previous) = previous {
            debug!(previous = %previous.root_fingerprint(), "Replacing registered keystore");
            previous.close();
        }

        let name = keystore.name();
        let first_use = self.config.modify_accounts(|cfg| {
            let first_use = !cfg.has_accounts_for(fingerprint);
            let record = cfg.get_or_add_keystore(fingerprint);
            record.name = name;
            record.last_connected = chrono::Utc::now();
            Ok::<_, BackendError>(first_use)
        })?;

        if first_use {
            self.persist_default_accounts(keystore.as_ref()).await?;
        }
        self.upgrade_signing_configurations(keystore.as_ref()).await?;

        let closed = {
            let mut state = self.state.write();
            state.keystore = Some(keystore.clone());
            self.rebuild_locked(&mut state)
        };
        close_accounts(closed);
        self.events.reload(SUBJECT_ACCOUNTS);

        self.connect.on_connect(keystore);

        // A waiting AOPP flow may sync and sign, which must not hold up registration.
        let weak = self.weak.clone();
        self.runtime.spawn(async move {
            if let Some(backend) = weak.upgrade() {
                backend.aopp_keystore_registered().await;
            }
        });
        Ok(())
    }

    /// Forget the registered keystore and rebuild without it.
    #[instrument(skip(self))]
    pub fn deregister_keystore(&self) {
        let (old, closed) = {
            let mut state = self.state.write();
            let old = state.keystore.take();
            let closed = self.rebuild_locked(&mut state);
            (old, closed)
        };
        close_accounts(closed);
        if let Some(keystore) = old {
            info!(fingerprint = %keystore.root_fingerprint(), "Keystore deregistered");
            keystore.close();
        }
        self.events.reload(SUBJECT_ACCOUNTS);
        self.connect.on_disconnect();
    }

    /// Persist the first account of every default coin the keystore supports.
    async fn persist_default_accounts(&self, keystore: &dyn Keystore) -> BackendResult<()> {
        let mut accounts = Vec::new();
        for &coin in self.options.default_coins() {
            if !keystore.supports_coin(coin) {
                continue;
            }
            match self.derive_configurations(keystore, coin, 0).await {
                Ok(configurations) => accounts.push(new_account(
                    keystore.root_fingerprint(),
                    coin,
                    0,
                    default_account_name(coin.name(), 0),
                    configurations,
                    false,
                )),
                Err(e) => warn!(%coin, error = %e, "Could not derive default account"),
            }
        }
        if accounts.is_empty() {
            return Ok(());
        }
        info!(count = accounts.len(), "Persisting default accounts");
        self.config.modify_accounts(|cfg| {
            for account in accounts {
                cfg.persist_account(account)?;
            }
            Ok::<_, BackendError>(())
        })
    }

    /// Append signing configurations for script types the keystore supports
    /// but the persisted accounts do not have yet.
    async fn upgrade_signing_configurations(&self, keystore: &dyn Keystore) -> BackendResult<()> {
        let fingerprint = keystore.root_fingerprint();
        let candidates = self.config.with_accounts(|cfg| missing_script_types(cfg, keystore));

        let mut upgrades = Vec::new();
        for (code, coin, missing) in candidates {
            let keypaths: Vec<_> = missing.iter().map(|(_, keypath)| keypath.clone()).collect();
            let xpubs = match keystore.btc_xpubs(coin, &keypaths).await {
                Ok(xpubs) if xpubs.len() == keypaths.len() => xpubs,
                Ok(_) => {
                    warn!(%code, "Keystore returned wrong number of xpubs");
                    continue;
                }
                Err(e) => {
                    warn!(%code, error = %e, "Could not derive xpubs for upgrade");
                    continue;
                }
            };
            let configurations: Vec<_> = missing
                .into_iter()
                .zip(xpubs)
                .map(|((script_type, keypath), xpub)| {
                    SigningConfiguration::bitcoin(script_type, fingerprint, keypath, xpub)
                })
                .collect();
            upgrades.push((code, configurations));
        }
        if upgrades.is_empty() {
            return Ok(());
        }

        self.config.modify_accounts(|cfg| {
            for (code, configurations) in upgrades {
                let account = cfg.account_mut(&code)?;
                for configuration in configurations {
                    info!(
                        %code,
                        script_type = %configuration.script_type().map_or("", |s| s.as_str()),
                        "Adding signing configuration"
                    );
                    account.configurations.push(configuration);
                }
            }
            Ok::<_, BackendError>(())
        })
    }

    /// Modify the catalogue and rebuild the registry from it.
    ///
    /// Holds the state lock for the whole operation; closes the replaced live
    /// accounts and emits `accounts` reload after releasing it.
    pub(crate) fn modify_and_rebuild<T, F>(&self, f: F) -> BackendResult<T>
    where
        F: FnOnce(&mut AccountsConfig) -> BackendResult<T>,
    {
        let (result, closed) = {
            let mut state = self.state.write();
            let result = self.config.modify_accounts(f)?;
            (result, self.rebuild_locked(&mut state))
        };
        close_accounts(closed);
        self.events.reload(SUBJECT_ACCOUNTS);
        Ok(result)
    }

    /// Rebuild the registry from the current catalogue.
    pub(crate) fn rebuild(&self) {
        let closed = {
            let mut state = self.state.write();
            self.rebuild_locked(&mut state)
        };
        close_accounts(closed);
        self.events.reload(SUBJECT_ACCOUNTS);
    }

    /// Wait for the keystore with `fingerprint`, prompting the user.
    ///
    /// Emits `connect-keystore` prompts; after a wrong keystore the prompt is
    /// shown again once it is unplugged, until the user cancels.
    #[instrument(skip(self))]
    pub async fn connect_keystore(
        &self,
        fingerprint: RootFingerprint,
    ) -> BackendResult<Arc<dyn Keystore>> {
        if let Some(keystore) = self.keystore() {
            if keystore.root_fingerprint() == fingerprint {
                return Ok(keystore);
            }
        }
        let keystore_name = self
            .config
            .with_accounts(|cfg| cfg.lookup_keystore(fingerprint).map(|k| k.name.clone()))
            .unwrap_or_default();

        loop {
            self.events.replace(
                SUBJECT_CONNECT_KEYSTORE,
                json!({"typ": "connect", "keystoreName": keystore_name}),
            );
            let result = self
                .connect
                .connect(self.keystore(), fingerprint, self.options.connect_timeout())
                .await;
            match result {
                Ok(keystore) => {
                    self.dismiss_connect_prompt();
                    return Ok(keystore);
                }
                Err(ConnectError::WrongKeystore) => {
                    self.events.replace(
                        SUBJECT_CONNECT_KEYSTORE,
                        json!({
                            "typ": "error",
                            "errorCode": ConnectError::WrongKeystore.code(),
                            "keystoreName": keystore_name,
                        }),
                    );
                    let (tx, rx) = oneshot::channel();
                    self.connect.set_retry_callback(Box::new(move |decision| {
                        let _ = tx.send(decision);
                    }));
                    match rx.await.unwrap_or(Err(ConnectError::UserAbort)) {
                        Ok(()) => {}
                        // A newer request took over the prompt.
                        Err(ConnectError::Replaced) => return Err(ConnectError::Replaced.into()),
                        Err(cause) => {
                            self.dismiss_connect_prompt();
                            return Err(cause.into());
                        }
                    }
                }
                // The newer request owns the prompt.
                Err(ConnectError::Replaced) => return Err(ConnectError::Replaced.into()),
                Err(e) => {
                    self.dismiss_connect_prompt();
                    return Err(e.into());
                }
            }
        }
    }

    /// Cancel a pending [`connect_keystore`](Self::connect_keystore).
    pub fn cancel_connect_keystore(&self) {
        self.connect.cancel(ConnectError::UserAbort);
    }

    fn dismiss_connect_prompt(&self) {
        self.events
            .replace(SUBJECT_CONNECT_KEYSTORE, json!({"typ": null}));
    }

    /// Keep (or stop keeping) the keystore's accounts loaded while disconnected.
    pub fn set_watchonly(&self, fingerprint: RootFingerprint, watchonly: bool) -> BackendResult<()> {
        self.modify_and_rebuild(|cfg| {
            let keystore = cfg
                .keystores
                .iter_mut()
                .find(|k| k.root_fingerprint == fingerprint)
                .ok_or(BackendError::KeystoreNotFound(fingerprint))?;
            keystore.watchonly = watchonly;
            Ok(())
        })
    }

    pub fn set_backup_reminder(&self, fingerprint: RootFingerprint, allowed: bool) -> BackendResult<()> {
        self.config.modify_accounts(|cfg| {
            let keystore = cfg
                .keystores
                .iter_mut()
                .find(|k| k.root_fingerprint == fingerprint)
                .ok_or(BackendError::KeystoreNotFound(fingerprint))?;
            keystore.backup_reminder_allowed = allowed;
            Ok(())
        })
    }

    /// Close every live account and the keystore.
    pub fn close(&self) {
        let (accounts, keystore) = {
            let mut state = self.state.write();
            (std::mem::take(&mut state.accounts), state.keystore.take())
        };
        close_accounts(accounts);
        if let Some(keystore) = keystore {
            keystore.close();
        }
        info!("Backend closed");
    }
}

/// A new persisted account with default flags.
pub(crate) fn new_account(
    fingerprint: RootFingerprint,
    coin: Coin,
    number: u16,
    name: String,
    configurations: SigningConfigurations,
    hidden: bool,
) -> Account {
    Account {
        used: false,
        inactive: false,
        hidden_because_unused: hidden,
        coin_code: coin.code().to_string(),
        name,
        code: regular_account_code(fingerprint, coin, number),
        configurations,
        active_tokens: Vec::new(),
        insurance_status: None,
        extra: Default::default(),
    }
}

/// Accounts of the keystore lacking a script type it supports, with the
/// missing script types and their key paths.
fn missing_script_types(
    cfg: &AccountsConfig,
    keystore: &dyn Keystore,
) -> Vec<(AccountCode, Coin, Vec<(ScriptType, AbsoluteKeypath)>)> {
    let fingerprint = keystore.root_fingerprint();
    cfg.accounts
        .iter()
        .filter_map(|account| {
            let coin = account.coin().ok()?;
            if !coin.is_btc_family() || account.root_fingerprint().ok()? != fingerprint {
                return None;
            }
            let number = account.account_number().ok()?;
            let missing: Vec<_> = default_key_paths(coin, number)
                .into_iter()
                .filter_map(|(script_type, keypath)| script_type.map(|s| (s, keypath)))
                .filter(|(script_type, _)| {
                    keystore.supports_account(coin, Some(*script_type))
                        && account.configurations.find_script_type(*script_type).is_none()
                })
                .collect();
            (!missing.is_empty()).then(|| (account.code.clone(), coin, missing))
        })
        .collect()
}

pub(crate) fn close_accounts(accounts: Vec<Arc<LiveAccount>>) {
    for account in accounts {
        account.close();
    }
}
