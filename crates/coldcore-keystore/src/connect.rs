//! Connect-keystore coordinator.
//!
//! A single slot for "please connect the keystore with fingerprint X". At most
//! one request is pending; a new request preempts the previous one, which then
//! resolves with [`ConnectError::Replaced`]. A UI retry loop waiting on the
//! previous request is ended the same way.

use crate::{ConnectError, Keystore};
use coldcore_signing::RootFingerprint;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Default time to wait for the user to connect the keystore.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a connect request.
pub type ConnectResult = Result<Arc<dyn Keystore>, ConnectError>;

/// Callback driving the UI retry loop.
///
/// Receives `Ok(())` to prompt again, or the reason the loop must stop.
pub type RetryCallback = Box<dyn FnOnce(Result<(), ConnectError>) + Send>;

struct Pending {
    id: u64,
    target: RootFingerprint,
    tx: oneshot::Sender<ConnectResult>,
}

#[derive(Default)]
struct Slot {
    next_id: u64,
    pending: Option<Pending>,
    retry: Option<RetryCallback>,
}

/// Resolves requests for a specific keystore.
///
/// The internal lock is never held while waiting.
#[derive(Default)]
pub struct ConnectKeystore {
    slot: Mutex<Slot>,
}

impl ConnectKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the keystore with fingerprint `target` is connected.
    ///
    /// Returns `current` right away if it already matches. Otherwise resolves
    /// when a keystore registers (matching or not), on `timeout`, on
    /// [`cancel`](Self::cancel) or when a newer request replaces this one.
    pub async fn connect(
        &self,
        current: Option<Arc<dyn Keystore>>,
        target: RootFingerprint,
        timeout: Duration,
    ) -> ConnectResult {
        if let Some(keystore) = current {
            if keystore.root_fingerprint() == target {
                return Ok(keystore);
            }
        }

        let (id, rx, superseded) = {
            let mut slot = self.slot.lock();
            if let Some(previous) = slot.pending.take() {
                debug!(target = %previous.target, "Replacing pending connect request");
                let _ = previous.tx.send(Err(ConnectError::Replaced));
            }
            let (tx, rx) = oneshot::channel();
            slot.next_id += 1;
            let id = slot.next_id;
            slot.pending = Some(Pending { id, target, tx });
            (id, rx, slot.retry.take())
        };
        if let Some(retry) = superseded {
            debug!("Ending retry loop of replaced request");
            retry(Err(ConnectError::Replaced));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without an answer: the slot was taken over.
            Ok(Err(_)) => Err(ConnectError::Replaced),
            Err(_) => {
                let mut slot = self.slot.lock();
                if slot.pending.as_ref().map_or(false, |p| p.id == id) {
                    slot.pending = None;
                }
                debug!(%target, "Connect request timed out");
                Err(ConnectError::Timeout)
            }
        }
    }

    /// A keystore was registered. Resolves the pending request, if any.
    pub fn on_connect(&self, keystore: Arc<dyn Keystore>) {
        let pending = self.slot.lock().pending.take();
        if let Some(pending) = pending {
            let result = if keystore.root_fingerprint() == pending.target {
                Ok(keystore)
            } else {
                Err(ConnectError::WrongKeystore)
            };
            let _ = pending.tx.send(result);
        }
    }

    /// The keystore was deregistered. Asks the UI loop to prompt again.
    pub fn on_disconnect(&self) {
        let retry = self.slot.lock().retry.take();
        if let Some(retry) = retry {
            retry(Ok(()));
        }
    }

    /// Resolve the pending request with `cause` and end the UI retry loop.
    pub fn cancel(&self, cause: ConnectError) {
        let (pending, retry) = {
            let mut slot = self.slot.lock();
            (slot.pending.take(), slot.retry.take())
        };
        if let Some(pending) = pending {
            let _ = pending.tx.send(Err(cause));
        }
        if let Some(retry) = retry {
            retry(Err(cause));
        }
    }

    /// Install the callback invoked on the next disconnect or cancel.
    pub fn set_retry_callback(&self, callback: RetryCallback) {
        self.slot.lock().retry = Some(callback);
    }

    /// Whether a request is waiting.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}
