//! Event bus towards the UI.
//!
//! One unbounded, ordered stream of `(subject, action, object)`. Events are
//! delivered in emission order and never coalesced.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

/// Subject of registry composition changes.
pub const SUBJECT_ACCOUNTS: &str = "accounts";

/// Subject of AOPP state snapshots.
pub const SUBJECT_AOPP: &str = "aopp";

/// Subject of connect-keystore prompts.
pub const SUBJECT_CONNECT_KEYSTORE: &str = "connect-keystore";

/// What the observer should do with the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Replace the subject's data with `object`.
    Replace,
    /// Refetch the subject.
    Reload,
}

/// A notification for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub subject: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

/// Events emitted by a single live account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEvent {
    SyncStarted,
    SyncDone,
    StatusChanged,
}

impl AccountEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            AccountEvent::SyncStarted => "sync-started",
            AccountEvent::SyncDone => "sync-done",
            AccountEvent::StatusChanged => "status-changed",
        }
    }
}

/// Sending half of the event stream.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    /// Create a bus and the receiver the UI layer consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Event) {
        trace!(subject = %event.subject, action = ?event.action, "Emitting event");
        // A dropped receiver means nobody is listening anymore.
        let _ = self.tx.send(event);
    }

    pub fn reload(&self, subject: impl Into<String>) {
        self.emit(Event {
            subject: subject.into(),
            action: Action::Reload,
            object: None,
        });
    }

    pub fn replace(&self, subject: impl Into<String>, object: Value) {
        self.emit(Event {
            subject: subject.into(),
            action: Action::Replace,
            object: Some(object),
        });
    }
}
