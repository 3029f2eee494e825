//! Connect-keystore tests.
//!
//! Prompts emitted while waiting for a specific keystore, wrong keystores,
//! cancellation, timeouts and preemption.

use crate::generators::*;
use crate::harness::*;
use coldcore_accounts::{Event, SUBJECT_CONNECT_KEYSTORE};
use coldcore_backend::BackendError;
use coldcore_keystore::ConnectError;
use serde_json::{json, Value};
use std::sync::Arc;

/// Prompt objects of the `connect-keystore` events in `events`.
fn prompts(events: &[Event]) -> Vec<Value> {
    events
        .iter()
        .filter(|e| e.subject == SUBJECT_CONNECT_KEYSTORE)
        .filter_map(|e| e.object.clone())
        .collect()
}

/// Wait for the next prompt of type `typ`.
async fn wait_for_prompt(test: &mut TestBackend, typ: &str) {
    loop {
        let events = test.wait_for_event(SUBJECT_CONNECT_KEYSTORE).await;
        if prompts(&events).last().map_or(false, |p| p["typ"] == typ) {
            return;
        }
    }
}

#[tokio::test]
async fn test_connected_keystore_returns_immediately() {
    let mut test = TestBackend::new();
    test.register_default().await;
    test.drain_events();

    let keystore = test.backend.connect_keystore(TEST_FINGERPRINT).await.unwrap();
    assert_eq!(keystore.root_fingerprint(), TEST_FINGERPRINT);
    assert!(prompts(&test.drain_events()).is_empty());
}

#[tokio::test]
async fn test_connect_resolves_on_registration() {
    let mut test = TestBackend::new();
    test.register_default().await;
    test.backend.deregister_keystore();
    test.drain_events();

    let backend = test.backend.clone();
    let request = tokio::spawn(async move { backend.connect_keystore(TEST_FINGERPRINT).await });
    wait_for_prompt(&mut test, "connect").await;

    test.register_default().await;
    let keystore = request.await.unwrap().unwrap();
    assert_eq!(keystore.root_fingerprint(), TEST_FINGERPRINT);

    let events = test.drain_events();
    assert_eq!(prompts(&events), vec![json!({"typ": null})]);
}

#[tokio::test]
async fn test_connect_prompt_names_keystore() {
    let mut test = TestBackend::new();
    test.register_default().await;
    test.backend.deregister_keystore();
    test.drain_events();

    let backend = test.backend.clone();
    let _request = tokio::spawn(async move { backend.connect_keystore(TEST_FINGERPRINT).await });
    let events = test.wait_for_event(SUBJECT_CONNECT_KEYSTORE).await;
    assert_eq!(
        prompts(&events),
        vec![json!({"typ": "connect", "keystoreName": "Mock keystore"})]
    );
    test.backend.cancel_connect_keystore();
}

#[tokio::test]
async fn test_wrong_keystore_prompts_again_after_unplug() {
    let mut test = TestBackend::new();
    let backend = test.backend.clone();
    let request = tokio::spawn(async move { backend.connect_keystore(TEST_FINGERPRINT).await });
    wait_for_prompt(&mut test, "connect").await;

    test.register(MockKeystore::new(fingerprint(0x66)).arc()).await;
    let events = test.wait_for_event(SUBJECT_CONNECT_KEYSTORE).await;
    assert_eq!(
        prompts(&events),
        vec![json!({"typ": "error", "errorCode": "wrongKeystore", "keystoreName": ""})]
    );

    // Unplugging the wrong keystore shows the prompt again.
    test.backend.deregister_keystore();
    wait_for_prompt(&mut test, "connect").await;

    test.register_default().await;
    let keystore = request.await.unwrap().unwrap();
    assert_eq!(keystore.root_fingerprint(), TEST_FINGERPRINT);
}

#[tokio::test]
async fn test_cancel_after_wrong_keystore() {
    let mut test = TestBackend::new();
    let backend = test.backend.clone();
    let request = tokio::spawn(async move { backend.connect_keystore(TEST_FINGERPRINT).await });
    wait_for_prompt(&mut test, "connect").await;

    test.register(MockKeystore::new(fingerprint(0x66)).arc()).await;
    wait_for_prompt(&mut test, "error").await;
    test.backend.cancel_connect_keystore();

    let err = request.await.unwrap().err().unwrap();
    assert!(matches!(err, BackendError::Connect(ConnectError::UserAbort)));
    let events = test.drain_events();
    assert_eq!(prompts(&events), vec![json!({"typ": null})]);
}

#[tokio::test]
async fn test_cancel_pending_request() {
    let mut test = TestBackend::new();
    let backend = test.backend.clone();
    let request = tokio::spawn(async move { backend.connect_keystore(TEST_FINGERPRINT).await });
    wait_for_prompt(&mut test, "connect").await;

    test.backend.cancel_connect_keystore();

    let err = request.await.unwrap().err().unwrap();
    match err {
        BackendError::Connect(cause) => assert!(cause.is_silent()),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(prompts(&test.drain_events()), vec![json!({"typ": null})]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out() {
    let mut test = TestBackend::new();
    test.drain_events();

    let err = test
        .backend
        .connect_keystore(TEST_FINGERPRINT)
        .await
        .err()
        .unwrap();

    assert_eq!(err.code(), "timeout");
    assert_eq!(
        prompts(&test.drain_events()),
        vec![
            json!({"typ": "connect", "keystoreName": ""}),
            json!({"typ": null})
        ]
    );
}

#[tokio::test]
async fn test_newer_request_replaces_older() {
    let mut test = TestBackend::new();
    let first_backend = test.backend.clone();
    let first =
        tokio::spawn(async move { first_backend.connect_keystore(fingerprint(0x01)).await });
    wait_for_prompt(&mut test, "connect").await;

    let second_backend = Arc::clone(&test.backend);
    let second = tokio::spawn(async move { second_backend.connect_keystore(TEST_FINGERPRINT).await });

    let err = first.await.unwrap().err().unwrap();
    assert!(matches!(err, BackendError::Connect(ConnectError::Replaced)));

    test.register_default().await;
    let keystore = second.await.unwrap().unwrap();
    assert_eq!(keystore.root_fingerprint(), TEST_FINGERPRINT);
}

#[tokio::test]
async fn test_newer_request_ends_wrong_keystore_loop() {
    let mut test = TestBackend::new();
    let first_backend = test.backend.clone();
    let first = tokio::spawn(async move { first_backend.connect_keystore(TEST_FINGERPRINT).await });
    wait_for_prompt(&mut test, "connect").await;
    test.register(MockKeystore::new(fingerprint(0x66)).arc()).await;
    wait_for_prompt(&mut test, "error").await;

    let second_backend = test.backend.clone();
    let second = tokio::spawn(async move { second_backend.connect_keystore(TEST_FINGERPRINT).await });

    let err = first.await.unwrap().err().unwrap();
    assert!(matches!(err, BackendError::Connect(ConnectError::Replaced)));

    test.backend.deregister_keystore();
    test.register_default().await;
    let keystore = second.await.unwrap().unwrap();
    assert_eq!(keystore.root_fingerprint(), TEST_FINGERPRINT);
}
