//! Live account registry.
//!
//! The registry is always rebuilt as a whole from the catalogue: every
//! rebuild closes the previous live accounts and loads fresh ones.

use crate::backend::State;
use crate::Backend;
use coldcore_accounts::{
    account_subject, AccountBackend, AccountConfig, AccountEvent, AccountObserver, AccountResult,
    LiveAccount, Notes,
};
use coldcore_config::{Account, AccountsConfig};
use coldcore_keystore::Keystore;
use coldcore_signing::{
    default_account_name, erc20_account_code, AccountCode, Coin, SigningConfigurations,
};
use std::sync::Arc;
use tracing::{debug, warn};

impl Backend {
    /// Live accounts in display order.
    pub fn accounts(&self) -> Vec<Arc<LiveAccount>> {
        self.state.read().accounts.clone()
    }

    pub fn lookup_account(&self, code: &AccountCode) -> Option<Arc<LiveAccount>> {
        self.state
            .read()
            .accounts
            .iter()
            .find(|account| &account.code() == code)
            .cloned()
    }

    /// Initialize one account, e.g. when the user opens it.
    pub async fn init_account(&self, code: &AccountCode) -> crate::BackendResult<()> {
        let account = self
            .lookup_account(code)
            .ok_or_else(|| crate::BackendError::AccountNotFound(code.clone()))?;
        account.initialize().await?;
        Ok(())
    }

    /// Replace the registry with accounts loaded from the catalogue.
    ///
    /// Returns the previous accounts; the caller closes them once the state
    /// lock is released.
    pub(crate) fn rebuild_locked(&self, state: &mut State) -> Vec<Arc<LiveAccount>> {
        let previous = std::mem::take(&mut state.accounts);
        let keystore = state.keystore.clone();
        // Account backends and notes are opened without holding the catalogue lock.
        let cfg = self.config.accounts();
        let mut accounts: Vec<_> = cfg
            .accounts
            .iter()
            .flat_map(|persisted| self.load_account(&cfg, persisted, keystore.as_deref()))
            .collect();
        sort_accounts(&mut accounts);
        debug!(count = accounts.len(), "Rebuilt account registry");
        state.accounts = accounts;
        previous
    }

    /// Live accounts for one persisted account: the account itself plus, for
    /// Ethereum, one sub-account per active token.
    fn load_account(
        &self,
        cfg: &AccountsConfig,
        persisted: &Account,
        keystore: Option<&dyn Keystore>,
    ) -> Vec<Arc<LiveAccount>> {
        let code = &persisted.code;
        let coin = match persisted.coin() {
            Ok(coin) => coin,
            Err(_) => {
                debug!(%code, coin = %persisted.coin_code, "Skipping account with unknown coin");
                return Vec::new();
            }
        };
        if coin.network() != self.options.network {
            return Vec::new();
        }
        let (root_fingerprint, account_number) =
            match (persisted.root_fingerprint(), persisted.account_number()) {
                (Ok(fp), Ok(number)) => (fp, number),
                _ => {
                    warn!(%code, "Skipping account with inconsistent signing configurations");
                    return Vec::new();
                }
            };

        let connected = keystore.filter(|k| k.root_fingerprint() == root_fingerprint);
        let configurations: SigningConfigurations = match connected {
            Some(keystore) => persisted
                .configurations
                .iter()
                .filter(|c| keystore.supports_account(coin, c.script_type()))
                .cloned()
                .collect(),
            None if cfg.is_account_watchonly(persisted) => persisted.configurations.clone(),
            None => return Vec::new(),
        };
        if configurations.is_empty() {
            debug!(%code, "Skipping account not supported by the keystore");
            return Vec::new();
        }

        let config = AccountConfig {
            code: code.clone(),
            name: persisted.name.clone(),
            coin,
            configurations,
            root_fingerprint,
            account_number,
            inactive: persisted.inactive,
            hidden_because_unused: persisted.hidden_because_unused,
            used: persisted.used,
            watchonly: connected.is_none(),
            insurance_status: persisted.insurance_status.clone(),
            parent: None,
        };

        let parent = match self.make_live_account(config.clone()) {
            Some(parent) => parent,
            None => return Vec::new(),
        };
        let mut live = vec![parent];
        if coin == Coin::Eth {
            for token_code in &persisted.active_tokens {
                let token = match Coin::from_erc20_code(token_code) {
                    Ok(token) => token,
                    Err(_) => {
                        warn!(%code, token = %token_code, "Skipping unknown token");
                        continue;
                    }
                };
                let erc20 = AccountConfig {
                    code: erc20_account_code(code, token_code),
                    name: default_account_name(token.name(), account_number),
                    coin: token,
                    used: false,
                    insurance_status: None,
                    parent: Some(code.clone()),
                    ..config.clone()
                };
                live.extend(self.make_live_account(erc20));
            }
        }
        live
    }

    fn make_live_account(&self, config: AccountConfig) -> Option<Arc<LiveAccount>> {
        let code = config.code.clone();
        let factory = &self.collaborators.accounts;
        let backend: AccountResult<Arc<dyn AccountBackend>> = if config.coin.is_btc_family() {
            factory.make_btc_account(&config)
        } else {
            factory.make_eth_account(&config)
        };
        let backend = match backend {
            Ok(backend) => backend,
            Err(e) => {
                warn!(%code, error = %e, "Could not create account backend");
                return None;
            }
        };
        let notes = match Notes::open(self.notes_path(&code)) {
            Ok(notes) => notes,
            Err(e) => {
                warn!(%code, error = %e, "Could not open notes");
                return None;
            }
        };

        let weak = self.weak.clone();
        let forward: AccountObserver = Arc::new(move |event: AccountEvent| {
            if let Some(backend) = weak.upgrade() {
                backend.on_account_event(&code, event);
            }
        });
        Some(LiveAccount::new(config, backend, notes, forward))
    }

    /// Forward an account event and check for usage once synced.
    fn on_account_event(&self, code: &AccountCode, event: AccountEvent) {
        self.events.reload(account_subject(code, event.subject()));
        if event != AccountEvent::SyncDone {
            return;
        }
        let weak = self.weak.clone();
        let code = code.clone();
        self.runtime.spawn(async move {
            if let Some(backend) = weak.upgrade() {
                if let Err(e) = backend.check_account_used(&code).await {
                    warn!(%code, error = %e, "Usage check failed");
                }
            }
        });
    }
}

/// Coin, then account number; ERC20 sub-accounts right after their parent.
pub(crate) fn sort_accounts(accounts: &mut [Arc<LiveAccount>]) {
    accounts.sort_by_cached_key(|account| {
        let config = account.config();
        let group = config.parent.clone().unwrap_or_else(|| config.code.clone());
        (
            config.coin.sort_rank(),
            config.account_number,
            group,
            config.is_erc20(),
            config.code,
        )
    });
}
