//! User-facing account operations.

use crate::backend::new_account;
use crate::{Backend, BackendError, BackendResult, InsuranceDetails, InsuranceQuery};
use coldcore_accounts::SUBJECT_ACCOUNTS;
use coldcore_keystore::{Keystore, KeystoreError};
use coldcore_signing::{
    account_hard_limit, default_key_paths, AccountCode, Coin, ScriptType, SigningConfiguration,
    SigningConfigurations,
};
use tracing::{debug, info, instrument, warn};

/// Insurance status recorded for the UI when it changes to this value.
const INSURANCE_CANCELED: &str = "canceled";

impl Backend {
    /// Derive the signing configurations of account `number` for every script
    /// type the keystore supports.
    pub(crate) async fn derive_configurations(
        &self,
        keystore: &dyn Keystore,
        coin: Coin,
        number: u16,
    ) -> BackendResult<SigningConfigurations> {
        let fingerprint = keystore.root_fingerprint();
        let paths: Vec<_> = default_key_paths(coin, number)
            .into_iter()
            .filter(|(script_type, _)| keystore.supports_account(coin, *script_type))
            .collect();
        if paths.is_empty() {
            return Err(BackendError::UnsupportedCoin(coin.code().to_string()));
        }

        if !coin.is_btc_family() {
            let keypath = paths[0].1.clone();
            let xpub = keystore.extended_public_key(coin, &keypath).await?;
            return Ok(SigningConfigurations::new(vec![SigningConfiguration::ethereum(
                fingerprint,
                keypath,
                xpub,
            )]));
        }

        let keypaths: Vec<_> = paths.iter().map(|(_, keypath)| keypath.clone()).collect();
        let xpubs = keystore.btc_xpubs(coin, &keypaths).await?;
        if xpubs.len() != keypaths.len() {
            return Err(KeystoreError::Device(format!(
                "expected {} xpubs, got {}",
                keypaths.len(),
                xpubs.len()
            ))
            .into());
        }
        Ok(paths
            .into_iter()
            .zip(xpubs)
            .filter_map(|((script_type, keypath), xpub)| {
                script_type.map(|s| SigningConfiguration::bitcoin(s, fingerprint, keypath, xpub))
            })
            .collect())
    }

    /// Whether another account of `coin` can be added. Returns the suggested
    /// name if so.
    pub fn can_add_account(&self, coin: Coin, keystore: &dyn Keystore) -> Option<String> {
        if coin.is_erc20() || !keystore.supports_coin(coin) {
            return None;
        }
        let fingerprint = keystore.root_fingerprint();
        let (hidden, next) = self.config.with_accounts(|cfg| {
            (
                cfg.find_hidden_account(coin, fingerprint)
                    .map(|account| account.name.clone()),
                cfg.next_account_number(coin, fingerprint),
            )
        });
        if hidden.is_some() {
            return hidden;
        }
        if (next as usize) >= account_hard_limit(coin)
            || (next > 0 && !keystore.supports_multiple_accounts())
        {
            return None;
        }
        Some(coldcore_signing::default_account_name(coin.name(), next))
    }

    /// Create a user account.
    ///
    /// Reuses the hidden account of the coin if there is one, otherwise
    /// derives and persists the next account.
    #[instrument(skip(self, keystore))]
    pub async fn create_and_persist_account(
        &self,
        coin: Coin,
        name: &str,
        keystore: &dyn Keystore,
    ) -> BackendResult<AccountCode> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BackendError::AccountNameEmpty);
        }
        if coin.is_erc20() || !keystore.supports_coin(coin) {
            return Err(BackendError::UnsupportedCoin(coin.code().to_string()));
        }
        let fingerprint = keystore.root_fingerprint();

        let hidden = self.config.with_accounts(|cfg| {
            cfg.find_hidden_account(coin, fingerprint)
                .map(|account| account.code.clone())
        });
        if let Some(code) = hidden {
            info!(%code, "Unhiding account");
            self.modify_and_rebuild(|cfg| {
                let account = cfg.account_mut(&code)?;
                account.hidden_because_unused = false;
                account.name = name.to_string();
                Ok(())
            })?;
            return Ok(code);
        }

        let next = self
            .config
            .with_accounts(|cfg| cfg.next_account_number(coin, fingerprint));
        if (next as usize) >= account_hard_limit(coin) {
            return Err(BackendError::AccountLimitReached);
        }
        if next > 0 && !keystore.supports_multiple_accounts() {
            return Err(BackendError::AccountLimitReached);
        }

        let configurations = self.derive_configurations(keystore, coin, next).await?;
        let account = new_account(
            fingerprint,
            coin,
            next,
            name.to_string(),
            configurations,
            false,
        );
        let code = account.code.clone();
        info!(%code, "Creating account");
        self.modify_and_rebuild(|cfg| Ok(cfg.persist_account(account)?))?;
        Ok(code)
    }

    /// Activate or deactivate an account.
    ///
    /// For an ERC20 sub-account this toggles the token on its parent.
    #[instrument(skip(self))]
    pub fn set_account_active(&self, code: &AccountCode, active: bool) -> BackendResult<()> {
        if let Some((parent, token_code)) = code.parse_erc20() {
            return self.set_token_active(&parent, &token_code, active);
        }
        self.modify_and_rebuild(|cfg| {
            cfg.account_mut(code)?.inactive = !active;
            Ok(())
        })
    }

    /// Add or remove an ERC20 token of an Ethereum account.
    #[instrument(skip(self))]
    pub fn set_token_active(
        &self,
        code: &AccountCode,
        token_code: &str,
        active: bool,
    ) -> BackendResult<()> {
        Coin::from_erc20_code(token_code)
            .map_err(|_| BackendError::UnsupportedCoin(token_code.to_string()))?;
        self.modify_and_rebuild(|cfg| Ok(cfg.set_token_active(code, token_code, active)?))
    }

    /// Rename an account. The registry is updated in place.
    #[instrument(skip(self))]
    pub fn rename_account(&self, code: &AccountCode, name: &str) -> BackendResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BackendError::AccountNameEmpty);
        }
        {
            let state = self.state.read();
            self.config.modify_accounts(|cfg| {
                cfg.account_mut(code)?.name = name.to_string();
                Ok::<_, BackendError>(())
            })?;
            if let Some(account) = state.accounts.iter().find(|a| &a.code() == code) {
                account.set_name(name);
            }
        }
        self.events.reload(SUBJECT_ACCOUNTS);
        Ok(())
    }

    /// Query the insurance status of one or all active Bitcoin accounts and
    /// persist changes.
    ///
    /// A status changing to canceled is recorded in the frontend settings so
    /// the UI can tell the user.
    #[instrument(skip(self))]
    pub async fn lookup_insured_accounts(
        &self,
        code: Option<&AccountCode>,
    ) -> BackendResult<Vec<InsuranceDetails>> {
        let queries: Vec<InsuranceQuery> = self
            .accounts()
            .iter()
            .map(|account| account.config())
            .filter(|config| {
                config.coin == Coin::Btc
                    && !config.inactive
                    && code.map_or(true, |code| &config.code == code)
            })
            .filter_map(|config| {
                let index = config.configurations.find_script_type(ScriptType::P2wpkh)?;
                let xpub = config.configurations.iter().nth(index)?.xpub().clone();
                Some(InsuranceQuery {
                    code: config.code,
                    xpub,
                })
            })
            .collect();
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let details = self
            .collaborators
            .insurance
            .lookup_bitsurance_accounts(&queries)
            .await?;

        let (changed, canceled) = {
            let state = self.state.read();
            let changes = self.config.modify_accounts(|cfg| {
                let mut changes = Vec::new();
                for detail in &details {
                    let Some(account) = cfg.lookup_mut(&detail.account_code) else {
                        continue;
                    };
                    let status = (!detail.status.is_empty()).then(|| detail.status.clone());
                    if account.insurance_status != status {
                        account.insurance_status = status.clone();
                        changes.push((detail.account_code.clone(), status));
                    }
                }
                Ok::<_, BackendError>(changes)
            })?;
            for (code, status) in &changes {
                if let Some(account) = state.accounts.iter().find(|a| &a.code() == code) {
                    account.set_insurance_status(status.clone());
                }
            }
            let canceled: Vec<AccountCode> = changes
                .iter()
                .filter(|(_, status)| status.as_deref() == Some(INSURANCE_CANCELED))
                .map(|(code, _)| code.clone())
                .collect();
            (!changes.is_empty(), canceled)
        };

        if !canceled.is_empty() {
            self.config.modify_app(|app| {
                for code in &canceled {
                    app.record_insurance_canceled(code.as_str());
                }
                Ok::<_, BackendError>(())
            })?;
        }
        if changed {
            debug!("Insurance status changed");
            self.events.reload(SUBJECT_ACCOUNTS);
        }
        Ok(details)
    }

    /// Find the Ethereum account owning `address`. Returns its code and name.
    pub async fn lookup_eth_account_by_address(
        &self,
        address: &str,
    ) -> BackendResult<(AccountCode, String)> {
        let candidates: Vec<_> = self
            .accounts()
            .into_iter()
            .filter(|account| {
                let config = account.config();
                config.coin.is_eth_family() && !config.is_erc20()
            })
            .collect();
        for account in candidates {
            match account.backend().matches_address(address).await {
                Ok(true) => {
                    let config = account.config();
                    return Ok((config.code, config.name));
                }
                Ok(false) => {}
                Err(e) => warn!(code = %account.code(), error = %e, "Address lookup failed"),
            }
        }
        Err(BackendError::AddressNotFound(address.to_string()))
    }

    /// Open a URL with the system handler. Only web links are allowed.
    pub fn system_open(&self, url: &str) -> BackendResult<()> {
        let parsed = url::Url::parse(url)
            .map_err(|e| crate::CollaboratorError(format!("invalid url: {}", e)))?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(crate::CollaboratorError(format!("blocked url scheme: {}", parsed.scheme())).into());
        }
        self.collaborators.environment.system_open(url)?;
        Ok(())
    }
}
