//! Collaborators for running the backend without chain access.
//!
//! Accounts load with an inert chain backend: no transactions, zero balance,
//! never synced. Enough to inspect and edit the catalogue and notes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coldcore_accounts::{
    AccountBackend, AccountConfig, AccountFactory, AccountObserver, AccountResult, AddressList,
    Balance, Transaction,
};
use coldcore_backend::{
    CollaboratorError, Collaborators, Environment, InsuranceClient, InsuranceDetails,
    InsuranceQuery, RatesUpdater,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

struct OfflineAccount;

#[async_trait]
impl AccountBackend for OfflineAccount {
    async fn initialize(&self) -> AccountResult<()> {
        Ok(())
    }

    async fn transactions(&self) -> AccountResult<Vec<Transaction>> {
        Ok(Vec::new())
    }

    async fn balance(&self) -> AccountResult<Balance> {
        Ok(Balance::default())
    }

    async fn unused_receive_addresses(&self) -> AccountResult<Vec<AddressList>> {
        Ok(Vec::new())
    }

    fn synced(&self) -> bool {
        false
    }

    fn observe(&self, _observer: AccountObserver) {}

    fn close(&self) {}

    fn fatal_error(&self) -> bool {
        false
    }
}

struct OfflineAccounts;

impl AccountFactory for OfflineAccounts {
    fn make_btc_account(&self, _config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>> {
        Ok(Arc::new(OfflineAccount))
    }

    fn make_eth_account(&self, _config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>> {
        Ok(Arc::new(OfflineAccount))
    }
}

struct NoRates;

impl RatesUpdater for NoRates {
    fn latest_price_for_pair(&self, unit: &str, fiat: &str) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError(format!("no rates offline for {}/{}", unit, fiat)))
    }

    fn price_at(&self, _unit: &str, _fiat: &str, _time: DateTime<Utc>) -> f64 {
        0.0
    }

    fn historical_data_available(&self, _unit: &str) -> bool {
        false
    }
}

struct NoInsurance;

#[async_trait]
impl InsuranceClient for NoInsurance {
    async fn lookup_bitsurance_accounts(
        &self,
        _accounts: &[InsuranceQuery],
    ) -> Result<Vec<InsuranceDetails>, CollaboratorError> {
        Err(CollaboratorError("insurance lookup needs network access".to_string()))
    }
}

/// Terminal environment. Save dialogs resolve to a fixed output path.
struct Terminal {
    output: Option<PathBuf>,
}

impl Environment for Terminal {
    fn notify_user(&self, text: &str) {
        info!("{}", text);
    }

    fn system_open(&self, url: &str) -> Result<(), CollaboratorError> {
        println!("{}", url);
        Ok(())
    }

    fn get_save_filename(&self, _suggested: &str) -> Option<PathBuf> {
        self.output.clone()
    }
}

pub fn collaborators(output: Option<PathBuf>) -> Collaborators {
    Collaborators {
        accounts: Arc::new(OfflineAccounts),
        rates: Arc::new(NoRates),
        insurance: Arc::new(NoInsurance),
        environment: Arc::new(Terminal { output }),
    }
}
