//! Account discovery.
//!
//! A hidden account is kept one past the last used account of every
//! Bitcoin-family coin. Once it is seen to be used it becomes visible and the
//! next hidden account is added.

use crate::backend::new_account;
use crate::{Backend, BackendError, BackendResult};
use coldcore_config::AccountsConfig;
use coldcore_keystore::Keystore;
use coldcore_signing::{account_hard_limit, default_account_name, AccountCode, Coin, RootFingerprint};
use tracing::{debug, info, instrument, warn};

impl Backend {
    /// Add at most one hidden account per discovery coin.
    ///
    /// For each coin the keystore supports, the next account is added if there
    /// is none yet, the highest one is used, or the limit is not reached.
    /// Concurrent calls run one after the other; a coin that fails is logged
    /// and does not stop the others.
    #[instrument(skip(self))]
    pub async fn maybe_add_hidden_accounts(&self) -> BackendResult<()> {
        let _running = self.discovery.lock().await;
        let Some(keystore) = self.keystore() else {
            return Ok(());
        };

        for &coin in self.options.discovery_coins() {
            if !keystore.supports_coin(coin) {
                continue;
            }
            if let Err(e) = self.add_hidden_account(keystore.as_ref(), coin).await {
                warn!(%coin, error = %e, "Discovery failed");
            }
        }
        Ok(())
    }

    async fn add_hidden_account(&self, keystore: &dyn Keystore, coin: Coin) -> BackendResult<()> {
        let fingerprint = keystore.root_fingerprint();
        let Some(next) = self.config.with_accounts(|cfg| next_hidden_number(cfg, coin, fingerprint))
        else {
            return Ok(());
        };

        let configurations = self.derive_configurations(keystore, coin, next).await?;
        let account = new_account(
            fingerprint,
            coin,
            next,
            default_account_name(coin.name(), next),
            configurations,
            true,
        );
        self.modify_and_rebuild(|cfg| {
            // Someone else added this account while the xpubs were derived.
            if next_hidden_number(cfg, coin, fingerprint) != Some(next) {
                debug!(code = %account.code, "Hidden account already added");
                return Ok(());
            }
            info!(code = %account.code, "Adding hidden account");
            Ok(cfg.persist_account(account)?)
        })
    }

    /// Mark the account used if it has transactions, then run discovery.
    ///
    /// Runs after every `sync-done` of an account.
    #[instrument(skip(self))]
    pub async fn check_account_used(&self, code: &AccountCode) -> BackendResult<()> {
        let Some(account) = self.lookup_account(code) else {
            return Ok(());
        };
        let config = account.config();
        if config.used || config.is_erc20() {
            return Ok(());
        }

        account.initialize().await?;
        let transactions = account.backend().transactions().await?;
        if transactions.is_empty() {
            debug!("Account unused");
            return self.maybe_add_hidden_accounts().await;
        }

        info!(transactions = transactions.len(), "Marking account used");
        self.modify_and_rebuild(|cfg| {
            cfg.account_mut(code)
                .map_err(BackendError::from)?
                .set_used();
            Ok(())
        })?;
        self.maybe_add_hidden_accounts().await
    }
}

/// Number of the hidden account to add next, if discovery should add one.
fn next_hidden_number(cfg: &AccountsConfig, coin: Coin, fingerprint: RootFingerprint) -> Option<u16> {
    match cfg.highest_account(coin, fingerprint) {
        None => Some(0),
        Some(highest) => {
            let next = highest.account_number().ok()? + 1;
            (highest.used || (next as usize) < account_hard_limit(coin)).then_some(next)
        }
    }
}
