//! External collaborators of the backend.
//!
//! Exchange rates, the insurance service and the host environment are
//! provided by the embedding application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coldcore_accounts::AccountFactory;
use coldcore_signing::{AccountCode, XPub};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Exchange rate source.
pub trait RatesUpdater: Send + Sync {
    /// Latest price of one `unit` in `fiat`.
    fn latest_price_for_pair(&self, unit: &str, fiat: &str) -> Result<f64, CollaboratorError>;

    /// Historical price, 0 when unknown.
    fn price_at(&self, unit: &str, fiat: &str, time: DateTime<Utc>) -> f64;

    /// Whether historical prices for `unit` have been fetched.
    fn historical_data_available(&self, unit: &str) -> bool;
}

/// Account sent to the insurance service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceQuery {
    pub code: AccountCode,
    /// Native segwit xpub of the account.
    pub xpub: XPub,
}

/// Insurance status of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceDetails {
    pub account_code: AccountCode,
    /// `active`, `processing`, `refused`, `canceled`, ... Empty if not insured.
    pub status: String,
    #[serde(default)]
    pub details: Value,
}

/// Insurance (Bitsurance) service client.
#[async_trait]
pub trait InsuranceClient: Send + Sync {
    async fn lookup_bitsurance_accounts(
        &self,
        accounts: &[InsuranceQuery],
    ) -> Result<Vec<InsuranceDetails>, CollaboratorError>;
}

/// Host environment of the application.
pub trait Environment: Send + Sync {
    /// Show a desktop notification.
    fn notify_user(&self, text: &str);

    /// Open a URL or file with the system handler.
    fn system_open(&self, url: &str) -> Result<(), CollaboratorError>;

    /// Ask the user where to save a file. `None` if canceled.
    fn get_save_filename(&self, suggested: &str) -> Option<PathBuf>;
}

/// Everything the backend needs from the outside.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountFactory>,
    pub rates: Arc<dyn RatesUpdater>,
    pub insurance: Arc<dyn InsuranceClient>,
    pub environment: Arc<dyn Environment>,
}
