//! Live accounts.

use crate::{
    AccountBackend, AccountConfig, AccountEvent, AccountObserver, AccountResult, Balance, Notes,
};
use coldcore_signing::{AccountCode, Coin};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, OnceCell};
use tracing::{debug, warn};

/// A loaded account: persisted configuration plus runtime state.
pub struct LiveAccount {
    config: RwLock<AccountConfig>,
    backend: Arc<dyn AccountBackend>,
    notes: Notes,
    initialized: OnceCell<()>,
    fatal: AtomicBool,
    closed: AtomicBool,
    sync_done: Notify,
    balance: RwLock<Option<Balance>>,
}

impl LiveAccount {
    /// Wrap `backend` and subscribe to its events.
    ///
    /// Every backend event is passed on to `forward`; `sync-done` also wakes
    /// [`wait_synced`](Self::wait_synced) callers.
    pub fn new(
        config: AccountConfig,
        backend: Arc<dyn AccountBackend>,
        notes: Notes,
        forward: AccountObserver,
    ) -> Arc<Self> {
        let account = Arc::new(Self {
            config: RwLock::new(config),
            backend,
            notes,
            initialized: OnceCell::new(),
            fatal: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sync_done: Notify::new(),
            balance: RwLock::new(None),
        });
        let weak = Arc::downgrade(&account);
        account.backend.observe(Arc::new(move |event: AccountEvent| {
            if let Some(account) = weak.upgrade() {
                if event == AccountEvent::SyncDone {
                    account.sync_done.notify_waiters();
                }
            }
            forward(event);
        }));
        account
    }

    pub fn code(&self) -> AccountCode {
        self.config.read().code.clone()
    }

    pub fn coin(&self) -> Coin {
        self.config.read().coin
    }

    /// Snapshot of the configuration.
    pub fn config(&self) -> AccountConfig {
        self.config.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        self.config.write().name = name.to_string();
    }

    pub fn set_insurance_status(&self, status: Option<String>) {
        self.config.write().insurance_status = status;
    }

    pub fn backend(&self) -> &Arc<dyn AccountBackend> {
        &self.backend
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    /// Initialize the backend once. A failure marks the account fatal.
    pub async fn initialize(&self) -> AccountResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                debug!(code = %self.code(), "Initializing account");
                self.backend.initialize().await.map_err(|e| {
                    warn!(code = %self.code(), error = %e, "Account failed to initialize");
                    self.fatal.store(true, Ordering::SeqCst);
                    e
                })
            })
            .await
            .map(|_| ())
    }

    pub fn initialized(&self) -> bool {
        self.initialized.initialized()
    }

    pub fn fatal_error(&self) -> bool {
        self.fatal.load(Ordering::SeqCst) || self.backend.fatal_error()
    }

    pub fn synced(&self) -> bool {
        self.backend.synced()
    }

    /// Wait for `sync-done`, checking [`synced`](Self::synced) every `poll`
    /// in case the event was missed.
    pub async fn wait_synced(&self, poll: Duration) {
        loop {
            let notified = self.sync_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.synced() {
                return;
            }
            tokio::select! {
                _ = &mut notified => return,
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Fetch the balance and keep it as the current snapshot.
    pub async fn balance(&self) -> AccountResult<Balance> {
        let balance = self.backend.balance().await?;
        *self.balance.write() = Some(balance.clone());
        Ok(balance)
    }

    /// Last fetched balance.
    pub fn balance_snapshot(&self) -> Option<Balance> {
        self.balance.read().clone()
    }

    /// Close the backend. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(code = %self.code(), "Closing account");
            self.backend.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LiveAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveAccount")
            .field("config", &*self.config.read())
            .field("initialized", &self.initialized())
            .field("fatal", &self.fatal.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountError, AddressList, Transaction};
    use async_trait::async_trait;
    use coldcore_signing::{RootFingerprint, SigningConfigurations};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Stub {
        fail_init: bool,
        init_calls: AtomicUsize,
        synced: AtomicBool,
        observer: Mutex<Option<AccountObserver>>,
    }

    impl Stub {
        fn fire(&self, event: AccountEvent) {
            let observer = self.observer.lock().clone();
            if let Some(observer) = observer {
                observer(event);
            }
        }
    }

    #[async_trait]
    impl AccountBackend for Stub {
        async fn initialize(&self) -> AccountResult<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(AccountError::Initialization("offline".to_string()))
            } else {
                Ok(())
            }
        }
        async fn transactions(&self) -> AccountResult<Vec<Transaction>> {
            Ok(vec![])
        }
        async fn balance(&self) -> AccountResult<Balance> {
            Ok(Balance::default())
        }
        async fn unused_receive_addresses(&self) -> AccountResult<Vec<AddressList>> {
            Ok(vec![])
        }
        fn synced(&self) -> bool {
            self.synced.load(Ordering::SeqCst)
        }
        fn observe(&self, observer: AccountObserver) {
            *self.observer.lock() = Some(observer);
        }
        fn close(&self) {}
        fn fatal_error(&self) -> bool {
            false
        }
    }

    fn config() -> AccountConfig {
        AccountConfig {
            code: AccountCode::from("v0-55555555-btc-0"),
            name: "Bitcoin".to_string(),
            coin: Coin::Btc,
            configurations: SigningConfigurations::default(),
            root_fingerprint: RootFingerprint([0x55; 4]),
            account_number: 0,
            inactive: false,
            hidden_because_unused: false,
            used: false,
            watchonly: false,
            insurance_status: None,
            parent: None,
        }
    }

    fn live(stub: Arc<Stub>, dir: &TempDir) -> (Arc<LiveAccount>, Arc<Mutex<Vec<AccountEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let forward = {
            let seen = seen.clone();
            Arc::new(move |event: AccountEvent| seen.lock().push(event)) as AccountObserver
        };
        let notes = Notes::open(dir.path().join("notes.json")).unwrap();
        (LiveAccount::new(config(), stub, notes, forward), seen)
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(Stub::default());
        let (account, _) = live(stub.clone(), &dir);
        account.initialize().await.unwrap();
        account.initialize().await.unwrap();
        assert_eq!(stub.init_calls.load(Ordering::SeqCst), 1);
        assert!(account.initialized());
        assert!(!account.fatal_error());
    }

    #[tokio::test]
    async fn test_failed_initialize_is_fatal() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(Stub {
            fail_init: true,
            ..Default::default()
        });
        let (account, _) = live(stub, &dir);
        assert!(account.initialize().await.is_err());
        assert!(account.fatal_error());
    }

    #[tokio::test]
    async fn test_sync_done_forwarded_and_wakes_waiter() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(Stub::default());
        let (account, seen) = live(stub.clone(), &dir);

        let waiter = {
            let account = account.clone();
            tokio::spawn(async move { account.wait_synced(Duration::from_secs(3600)).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        stub.fire(AccountEvent::SyncDone);
        waiter.await.unwrap();
        assert_eq!(*seen.lock(), vec![AccountEvent::SyncDone]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_synced_polls() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(Stub::default());
        let (account, _) = live(stub.clone(), &dir);
        let waiter = {
            let account = account.clone();
            tokio::spawn(async move { account.wait_synced(Duration::from_secs(1)).await })
        };
        // Synced without an event: picked up by the next poll.
        stub.synced.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(2)).await;
        waiter.await.unwrap();
    }
}
