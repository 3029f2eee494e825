//! Test harness for integration tests.
//!
//! In-memory keystore, chain backends and collaborators, a backend wired to
//! them in a temporary data directory, and a local AOPP callback server.

use crate::generators::{test_transaction, test_xpub, BTC_P2WPKH_ADDRESS, TEST_FINGERPRINT, TEST_SIGNATURE};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use coldcore_accounts::{
    AccountBackend, AccountConfig, AccountError, AccountEvent, AccountFactory, AccountObserver,
    AccountResult, Address, AddressList, Balance, Event, Transaction,
};
use coldcore_backend::{
    Backend, BackendOptions, CollaboratorError, Collaborators, Environment, InsuranceClient,
    InsuranceDetails, InsuranceQuery, RatesUpdater,
};
use coldcore_keystore::{Keystore, KeystoreError, KeystoreResult};
use coldcore_signing::{
    AbsoluteKeypath, AccountCode, Coin, Network, RootFingerprint, ScriptType, XPub,
};
use num_bigint::BigUint;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============================================================================
// Keystore
// ============================================================================

/// In-memory keystore. Supports every coin and script type except P2PKH by
/// default.
pub struct MockKeystore {
    pub fingerprint: RootFingerprint,
    pub name: String,
    pub unsupported_coins: Vec<Coin>,
    pub unsupported_script_types: Vec<ScriptType>,
    pub multiple_accounts: bool,
    pub can_sign: bool,
    /// Delay of every xpub request, as a device round trip would take.
    pub xpub_delay: Duration,
    /// Coins whose xpub requests fail.
    pub xpub_failing_coins: Vec<Coin>,
    /// Returned by the next signing request instead of a signature.
    pub sign_error: Mutex<Option<KeystoreError>>,
    /// Messages signed so far.
    pub signed: Mutex<Vec<Vec<u8>>>,
    pub closed: AtomicBool,
}

impl MockKeystore {
    pub fn new(fingerprint: RootFingerprint) -> Self {
        Self {
            fingerprint,
            name: "Mock keystore".to_string(),
            unsupported_coins: Vec::new(),
            unsupported_script_types: vec![ScriptType::P2pkh],
            multiple_accounts: true,
            can_sign: true,
            xpub_delay: Duration::ZERO,
            xpub_failing_coins: Vec::new(),
            sign_error: Mutex::new(None),
            signed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    async fn derive(&self, coin: Coin, keypath: &AbsoluteKeypath) -> KeystoreResult<XPub> {
        tokio::time::sleep(self.xpub_delay).await;
        if self.xpub_failing_coins.contains(&coin) {
            return Err(KeystoreError::Device(format!("cannot derive {}", keypath)));
        }
        Ok(test_xpub(self.fingerprint, coin, keypath))
    }

    fn sign(&self, message: &[u8]) -> KeystoreResult<Vec<u8>> {
        if let Some(err) = self.sign_error.lock().take() {
            return Err(err);
        }
        self.signed.lock().push(message.to_vec());
        Ok(TEST_SIGNATURE.to_vec())
    }
}

impl Default for MockKeystore {
    fn default() -> Self {
        Self::new(TEST_FINGERPRINT)
    }
}

#[async_trait]
impl Keystore for MockKeystore {
    fn root_fingerprint(&self) -> RootFingerprint {
        self.fingerprint
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn supports_coin(&self, coin: Coin) -> bool {
        !self.unsupported_coins.contains(&coin)
    }

    fn supports_account(&self, coin: Coin, script_type: Option<ScriptType>) -> bool {
        self.supports_coin(coin)
            && script_type.map_or(true, |s| !self.unsupported_script_types.contains(&s))
    }

    fn supports_multiple_accounts(&self) -> bool {
        self.multiple_accounts
    }

    fn can_sign_message(&self, coin: Coin) -> bool {
        self.can_sign && self.supports_coin(coin)
    }

    async fn extended_public_key(
        &self,
        coin: Coin,
        keypath: &AbsoluteKeypath,
    ) -> KeystoreResult<XPub> {
        self.derive(coin, keypath).await
    }

    async fn btc_xpubs(
        &self,
        coin: Coin,
        keypaths: &[AbsoluteKeypath],
    ) -> KeystoreResult<Vec<XPub>> {
        let mut xpubs = Vec::with_capacity(keypaths.len());
        for keypath in keypaths {
            xpubs.push(self.derive(coin, keypath).await?);
        }
        Ok(xpubs)
    }

    async fn sign_btc_message(
        &self,
        message: &[u8],
        _keypath: &AbsoluteKeypath,
        _script_type: ScriptType,
        _coin: Coin,
    ) -> KeystoreResult<Vec<u8>> {
        self.sign(message)
    }

    async fn sign_eth_message(
        &self,
        message: &[u8],
        _keypath: &AbsoluteKeypath,
    ) -> KeystoreResult<Vec<u8>> {
        self.sign(message)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Chain backends
// ============================================================================

/// In-memory chain backend of one live account.
pub struct MockAccountBackend {
    pub config: AccountConfig,
    pub fail_init: bool,
    pub transactions: Mutex<Vec<Transaction>>,
    pub balance: Mutex<Balance>,
    pub synced: AtomicBool,
    pub fatal: AtomicBool,
    pub closed: AtomicBool,
    observer: Mutex<Option<AccountObserver>>,
}

impl MockAccountBackend {
    fn new(config: &AccountConfig) -> Self {
        Self {
            config: config.clone(),
            fail_init: false,
            transactions: Mutex::new(Vec::new()),
            balance: Mutex::new(Balance::default()),
            synced: AtomicBool::new(true),
            fatal: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            observer: Mutex::new(None),
        }
    }

    /// Emit an account event as the chain client would.
    pub fn fire(&self, event: AccountEvent) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer(event);
        }
    }

    /// Address the mock Ethereum account owns.
    pub fn eth_address(code: &AccountCode) -> String {
        format!("0x{}", code)
    }

    fn address(&self, script_type: Option<ScriptType>) -> String {
        match script_type {
            Some(ScriptType::P2wpkh) => BTC_P2WPKH_ADDRESS.to_string(),
            Some(script_type) => format!("{}-address-{}", script_type, self.config.code),
            None => Self::eth_address(&self.config.code),
        }
    }
}

#[async_trait]
impl AccountBackend for MockAccountBackend {
    async fn initialize(&self) -> AccountResult<()> {
        if self.fail_init {
            return Err(AccountError::Initialization("mock failure".to_string()));
        }
        self.fire(AccountEvent::SyncStarted);
        Ok(())
    }

    async fn transactions(&self) -> AccountResult<Vec<Transaction>> {
        Ok(self.transactions.lock().clone())
    }

    async fn balance(&self) -> AccountResult<Balance> {
        Ok(self.balance.lock().clone())
    }

    async fn unused_receive_addresses(&self) -> AccountResult<Vec<AddressList>> {
        Ok(self
            .config
            .configurations
            .iter()
            .map(|configuration| AddressList {
                configuration: configuration.clone(),
                addresses: vec![Address {
                    id: format!("{}/0/0", configuration.keypath()),
                    encoded: self.address(configuration.script_type()),
                    keypath: configuration.keypath().child(0, false).child(0, false),
                }],
            })
            .collect())
    }

    fn synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn observe(&self, observer: AccountObserver) {
        *self.observer.lock() = Some(observer);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn fatal_error(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    async fn matches_address(&self, address: &str) -> AccountResult<bool> {
        Ok(self.config.coin.is_eth_family()
            && address.eq_ignore_ascii_case(&Self::eth_address(&self.config.code)))
    }
}

/// Builds [`MockAccountBackend`]s and remembers the latest one per code.
#[derive(Default)]
pub struct MockAccountFactory {
    backends: Mutex<HashMap<AccountCode, Arc<MockAccountBackend>>>,
    /// Accounts created with one transaction.
    pub used: Mutex<HashSet<AccountCode>>,
    /// Balances set on creation.
    pub balances: Mutex<HashMap<AccountCode, BigUint>>,
    /// Accounts whose backend fails to initialize.
    pub failing: Mutex<HashSet<AccountCode>>,
    /// Accounts whose backend cannot be created.
    pub broken: Mutex<HashSet<AccountCode>>,
    /// Whether new backends start out synced.
    pub unsynced: AtomicBool,
    pub created: Mutex<Vec<AccountCode>>,
    /// Called with every account config before its backend is built.
    pub on_make: Mutex<Option<MakeHook>>,
}

pub type MakeHook = Arc<dyn Fn(&AccountConfig) + Send + Sync>;

impl MockAccountFactory {
    /// Latest backend created for `code`.
    pub fn backend(&self, code: &str) -> Arc<MockAccountBackend> {
        self.backends
            .lock()
            .get(&AccountCode::from(code))
            .cloned()
            .unwrap_or_else(|| panic!("no backend for {}", code))
    }

    pub fn set_used(&self, code: &str) {
        self.used.lock().insert(AccountCode::from(code));
    }

    pub fn set_balance(&self, code: &str, amount: u64) {
        self.balances
            .lock()
            .insert(AccountCode::from(code), BigUint::from(amount));
    }

    fn make(&self, config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>> {
        let hook = self.on_make.lock().clone();
        if let Some(hook) = hook {
            hook(config);
        }
        if self.broken.lock().contains(&config.code) {
            return Err(AccountError::Backend("mock backend unavailable".to_string()));
        }
        let mut backend = MockAccountBackend::new(config);
        backend.fail_init = self.failing.lock().contains(&config.code);
        if self.unsynced.load(Ordering::SeqCst) {
            backend.synced.store(false, Ordering::SeqCst);
        }
        if self.used.lock().contains(&config.code) {
            backend
                .transactions
                .lock()
                .push(test_transaction(&format!("{}-tx:0", config.code)));
        }
        if let Some(amount) = self.balances.lock().get(&config.code) {
            backend.balance.lock().available = amount.clone();
        }
        let backend = Arc::new(backend);
        self.backends
            .lock()
            .insert(config.code.clone(), backend.clone());
        self.created.lock().push(config.code.clone());
        Ok(backend)
    }
}

impl AccountFactory for MockAccountFactory {
    fn make_btc_account(&self, config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>> {
        self.make(config)
    }

    fn make_eth_account(&self, config: &AccountConfig) -> AccountResult<Arc<dyn AccountBackend>> {
        self.make(config)
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Fixed exchange rates keyed by unit.
#[derive(Default)]
pub struct MockRates {
    pub prices: Mutex<HashMap<String, f64>>,
    pub historical: Mutex<HashSet<String>>,
    pub fail: AtomicBool,
}

impl MockRates {
    pub fn set_price(&self, unit: &str, price: f64) {
        self.prices.lock().insert(unit.to_string(), price);
    }
}

impl RatesUpdater for MockRates {
    fn latest_price_for_pair(&self, unit: &str, fiat: &str) -> Result<f64, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError("rates unavailable".to_string()));
        }
        self.prices
            .lock()
            .get(unit)
            .copied()
            .ok_or_else(|| CollaboratorError(format!("no rate for {}/{}", unit, fiat)))
    }

    fn price_at(&self, unit: &str, _fiat: &str, _time: DateTime<Utc>) -> f64 {
        if self.historical.lock().contains(unit) {
            self.prices.lock().get(unit).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    fn historical_data_available(&self, unit: &str) -> bool {
        self.historical.lock().contains(unit)
    }
}

/// Insurance service returning a preset response.
#[derive(Default)]
pub struct MockInsurance {
    pub response: Mutex<Vec<InsuranceDetails>>,
    pub queries: Mutex<Vec<Vec<InsuranceQuery>>>,
}

impl MockInsurance {
    pub fn set_status(&self, code: &str, status: &str) {
        let mut response = self.response.lock();
        response.retain(|d| d.account_code.as_str() != code);
        response.push(InsuranceDetails {
            account_code: AccountCode::from(code),
            status: status.to_string(),
            details: Value::Null,
        });
    }
}

#[async_trait]
impl InsuranceClient for MockInsurance {
    async fn lookup_bitsurance_accounts(
        &self,
        accounts: &[InsuranceQuery],
    ) -> Result<Vec<InsuranceDetails>, CollaboratorError> {
        self.queries.lock().push(accounts.to_vec());
        let queried: HashSet<_> = accounts.iter().map(|q| q.code.clone()).collect();
        Ok(self
            .response
            .lock()
            .iter()
            .filter(|d| queried.contains(&d.account_code))
            .cloned()
            .collect())
    }
}

/// Records notifications and opened URLs.
#[derive(Default)]
pub struct MockEnvironment {
    pub save_path: Mutex<Option<PathBuf>>,
    pub notifications: Mutex<Vec<String>>,
    pub opened: Mutex<Vec<String>>,
}

impl Environment for MockEnvironment {
    fn notify_user(&self, text: &str) {
        self.notifications.lock().push(text.to_string());
    }

    fn system_open(&self, url: &str) -> Result<(), CollaboratorError> {
        self.opened.lock().push(url.to_string());
        Ok(())
    }

    fn get_save_filename(&self, _suggested: &str) -> Option<PathBuf> {
        self.save_path.lock().clone()
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Backend wired to mocks in a temporary data directory.
pub struct TestBackend {
    pub backend: Arc<Backend>,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub factory: Arc<MockAccountFactory>,
    pub rates: Arc<MockRates>,
    pub insurance: Arc<MockInsurance>,
    pub environment: Arc<MockEnvironment>,
    temp_dir: TempDir,
}

impl TestBackend {
    /// Mainnet backend with fast AOPP polling. Needs a tokio runtime.
    pub fn new() -> Self {
        Self::with_network(Network::Mainnet)
    }

    pub fn with_network(network: Network) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::open(temp_dir, network, MockAccountFactory::default())
    }

    /// Open a backend on an existing data directory.
    pub fn open(temp_dir: TempDir, network: Network, factory: MockAccountFactory) -> Self {
        let mut options = BackendOptions::new(temp_dir.path()).with_network(network);
        options.aopp_sync_poll_ms = 10;
        options.connect_timeout_secs = 5;
        Self::open_with(temp_dir, options, factory)
    }

    pub fn open_with(temp_dir: TempDir, options: BackendOptions, factory: MockAccountFactory) -> Self {
        let factory = Arc::new(factory);
        let rates = Arc::new(MockRates::default());
        let insurance = Arc::new(MockInsurance::default());
        let environment = Arc::new(MockEnvironment::default());
        let collaborators = Collaborators {
            accounts: factory.clone(),
            rates: rates.clone(),
            insurance: insurance.clone(),
            environment: environment.clone(),
        };
        let (backend, events) =
            Backend::new(options, collaborators).expect("Failed to create backend");
        Self {
            backend,
            events,
            factory,
            rates,
            insurance,
            environment,
            temp_dir,
        }
    }

    /// Close the backend and reopen the same data directory.
    pub fn reopen(self) -> Self {
        let network = self.backend.options().network;
        self.backend.close();
        Self::open(self.temp_dir, network, MockAccountFactory::default())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Register the default mock keystore.
    pub async fn register_default(&self) -> Arc<MockKeystore> {
        let keystore = MockKeystore::default().arc();
        self.register(keystore.clone()).await;
        keystore
    }

    pub async fn register(&self, keystore: Arc<MockKeystore>) {
        self.backend
            .register_keystore(keystore)
            .await
            .expect("Failed to register keystore");
    }

    /// Codes of the live accounts, in registry order.
    pub fn codes(&self) -> Vec<String> {
        self.backend
            .accounts()
            .iter()
            .map(|account| account.code().to_string())
            .collect()
    }

    /// Codes of the persisted accounts, in catalogue order.
    pub fn persisted_codes(&self) -> Vec<String> {
        self.backend
            .config()
            .accounts()
            .accounts
            .iter()
            .map(|account| account.code.to_string())
            .collect()
    }

    /// Add accounts straight to the catalogue.
    pub fn persist(&self, accounts: Vec<coldcore_config::Account>) {
        self.backend
            .config()
            .modify_accounts(|cfg| {
                for account in accounts {
                    cfg.persist_account(account)?;
                }
                Ok::<_, coldcore_config::ConfigError>(())
            })
            .expect("Failed to persist accounts");
    }

    /// Events emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait until an event with `subject` arrives, returning all events seen.
    pub async fn wait_for_event(&mut self, subject: &str) -> Vec<Event> {
        let mut seen = Vec::new();
        let deadline = tokio::time::sleep(Duration::from_secs(5));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let event = event.expect("event stream closed");
                    let done = event.subject == subject;
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                _ = &mut deadline => panic!("no {} event, saw {:?}", subject, seen),
            }
        }
    }

    /// Poll `condition` until it holds.
    pub async fn eventually(&self, condition: impl Fn(&Self) -> bool) {
        for _ in 0..500 {
            if condition(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}

/// AOPP states from the `aopp` events in `events`.
pub fn aopp_states(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter(|event| event.subject == coldcore_accounts::SUBJECT_AOPP)
        .filter_map(|event| event.object.as_ref())
        .filter_map(|object| object["state"].as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// AOPP callback server
// ============================================================================

type Recorded = Arc<Mutex<Vec<Value>>>;

/// Local HTTP server recording AOPP callback bodies.
pub struct CallbackServer {
    pub url: String,
    pub bodies: Recorded,
    handle: JoinHandle<()>,
}

async fn record_callback(
    State((bodies, status)): State<(Recorded, StatusCode)>,
    Json(body): Json<Value>,
) -> StatusCode {
    bodies.lock().push(body);
    status
}

impl CallbackServer {
    /// Answer every callback with `status`.
    pub async fn start(status: StatusCode) -> Self {
        let bodies: Recorded = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/callback", post(record_callback))
            .with_state((bodies.clone(), status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind callback server");
        let addr = listener.local_addr().expect("Failed to get local address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            url: format!("http://{}/callback", addr),
            bodies,
            handle,
        }
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().clone()
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_keystore_xpubs_are_deterministic() {
        let keystore = MockKeystore::default();
        let path: AbsoluteKeypath = "m/84'/0'/0'".parse().unwrap();
        let a = keystore.btc_xpubs(Coin::Btc, &[path.clone()]).await.unwrap();
        let b = keystore.extended_public_key(Coin::Btc, &path).await.unwrap();
        assert_eq!(a, vec![b]);
        assert!(!keystore.supports_account(Coin::Btc, Some(ScriptType::P2pkh)));
        assert!(keystore.supports_account(Coin::Eth, None));
    }

    #[tokio::test]
    async fn test_backend_starts_empty() {
        let mut test = TestBackend::new();
        assert!(test.codes().is_empty());
        let events = test.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, "accounts");
    }

    #[tokio::test]
    async fn test_callback_server_records() {
        let server = CallbackServer::start(StatusCode::NO_CONTENT).await;
        let status = post_json(&server.url, "{\"version\":0}").await;
        assert_eq!(status, 204);
        assert_eq!(server.bodies().len(), 1);
    }

    async fn post_json(url: &str, body: &str) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let addr = url
            .trim_start_matches("http://")
            .trim_end_matches("/callback")
            .to_string();
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST /callback HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response[9..12].parse().unwrap()
    }
}
