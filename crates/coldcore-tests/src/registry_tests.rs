//! Registry and keystore lifecycle tests.
//!
//! Loading accounts from the catalogue, keystore registration and
//! deregistration, watch-only accounts and ERC20 sub-accounts.

use crate::generators::*;
use crate::harness::*;
use coldcore_accounts::{AccountConfig, AccountEvent, SUBJECT_ACCOUNTS};
use coldcore_backend::BackendError;
use coldcore_config::ConfigError;
use coldcore_signing::{Coin, Network, ScriptType};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_first_registration_creates_default_accounts() {
    let mut test = TestBackend::new();
    test.drain_events();
    test.register_default().await;

    assert_eq!(
        test.persisted_codes(),
        vec!["v0-55555555-btc-0", "v0-55555555-ltc-0", "v0-55555555-eth-0"]
    );
    assert_eq!(
        test.codes(),
        vec!["v0-55555555-btc-0", "v0-55555555-ltc-0", "v0-55555555-eth-0"]
    );

    let keystore = test
        .backend
        .config()
        .accounts()
        .lookup_keystore(TEST_FINGERPRINT)
        .cloned()
        .unwrap();
    assert_eq!(keystore.name, "Mock keystore");
    assert!(!keystore.watchonly);

    let events = test.drain_events();
    assert!(events.iter().any(|e| e.subject == SUBJECT_ACCOUNTS));
}

#[tokio::test]
async fn test_default_accounts_skip_unsupported_coins() {
    let test = TestBackend::new();
    let mut keystore = MockKeystore::default();
    keystore.unsupported_coins = vec![Coin::Ltc, Coin::Eth];
    test.register(keystore.arc()).await;

    assert_eq!(test.persisted_codes(), vec!["v0-55555555-btc-0"]);
}

#[tokio::test]
async fn test_default_btc_account_has_supported_script_types() {
    let test = TestBackend::new();
    test.register_default().await;

    let account = test.backend.lookup_account(&code("v0-55555555-btc-0")).unwrap();
    let script_types: Vec<_> = account
        .config()
        .configurations
        .iter()
        .filter_map(|c| c.script_type())
        .collect();
    assert_eq!(
        script_types,
        vec![ScriptType::P2wpkh, ScriptType::P2tr, ScriptType::P2wpkhP2sh]
    );
}

#[tokio::test]
async fn test_reregistration_keeps_catalogue() {
    let test = TestBackend::new();
    test.register_default().await;
    test.backend.deregister_keystore();
    test.register_default().await;

    assert_eq!(test.persisted_codes().len(), 3);
    assert_eq!(test.codes().len(), 3);
}

#[tokio::test]
async fn test_registration_closes_previous_keystore() {
    let test = TestBackend::new();
    let first = test.register_default().await;
    let second = MockKeystore::new(fingerprint(0x66)).arc();
    test.register(second.clone()).await;

    assert!(first.closed.load(Ordering::SeqCst));
    assert!(!second.closed.load(Ordering::SeqCst));
    // The first keystore's accounts are not watch-only and disappear.
    assert!(test.codes().iter().all(|c| c.starts_with("v0-66666666-")));
}

#[tokio::test]
async fn test_registration_adds_missing_script_types() {
    let test = TestBackend::new();
    test.persist(vec![account_with(
        TEST_FINGERPRINT,
        Coin::Btc,
        0,
        test_configurations(TEST_FINGERPRINT, Coin::Btc, 0, Some(&[ScriptType::P2wpkh])),
    )]);
    test.register_default().await;

    // Not a first use: no default accounts.
    assert_eq!(test.persisted_codes(), vec!["v0-55555555-btc-0"]);
    let persisted = test
        .backend
        .config()
        .accounts()
        .lookup(&code("v0-55555555-btc-0"))
        .cloned()
        .unwrap();
    let script_types: Vec<_> = persisted
        .configurations
        .iter()
        .filter_map(|c| c.script_type())
        .collect();
    assert_eq!(
        script_types,
        vec![ScriptType::P2wpkh, ScriptType::P2tr, ScriptType::P2wpkhP2sh]
    );
}

#[tokio::test]
async fn test_unsupported_script_types_filtered_from_live_account() {
    let test = TestBackend::new();
    test.persist(vec![test_account(TEST_FINGERPRINT, Coin::Btc, 0)]);
    let mut keystore = MockKeystore::default();
    keystore.unsupported_script_types = vec![ScriptType::P2pkh, ScriptType::P2tr];
    test.register(keystore.arc()).await;

    let live = test.backend.lookup_account(&code("v0-55555555-btc-0")).unwrap();
    assert_eq!(live.config().configurations.len(), 2);
    // The catalogue keeps all four.
    let persisted = test.backend.config().accounts();
    assert_eq!(persisted.accounts[0].configurations.len(), 4);
}

// ============================================================================
// Deregistration and watch-only
// ============================================================================

#[tokio::test]
async fn test_deregistration_unloads_accounts() {
    let test = TestBackend::new();
    let keystore = test.register_default().await;
    let btc = test.factory.backend("v0-55555555-btc-0");

    test.backend.deregister_keystore();

    assert!(test.codes().is_empty());
    assert!(test.backend.keystore().is_none());
    assert!(keystore.closed.load(Ordering::SeqCst));
    assert!(btc.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_watchonly_accounts_stay_loaded() {
    let test = TestBackend::new();
    test.register_default().await;
    test.backend.set_watchonly(TEST_FINGERPRINT, true).unwrap();
    test.backend.deregister_keystore();

    assert_eq!(test.codes().len(), 3);
    for account in test.backend.accounts() {
        assert!(account.config().watchonly);
    }
}

#[tokio::test]
async fn test_hidden_accounts_are_never_watchonly() {
    let test = TestBackend::new();
    test.register_default().await;
    test.persist(vec![hidden_account(TEST_FINGERPRINT, Coin::Btc, 1)]);
    test.backend.set_watchonly(TEST_FINGERPRINT, true).unwrap();
    assert_eq!(test.codes().len(), 4);

    test.backend.deregister_keystore();
    assert!(!test.codes().contains(&"v0-55555555-btc-1".to_string()));
    assert_eq!(test.codes().len(), 3);
}

#[tokio::test]
async fn test_disabling_watchonly_unloads_disconnected_accounts() {
    let test = TestBackend::new();
    test.register_default().await;
    test.backend.set_watchonly(TEST_FINGERPRINT, true).unwrap();
    test.backend.deregister_keystore();
    assert_eq!(test.codes().len(), 3);

    test.backend.set_watchonly(TEST_FINGERPRINT, false).unwrap();

    assert!(test.codes().is_empty());
    // The catalogue is untouched.
    assert_eq!(test.persisted_codes().len(), 3);
}

#[tokio::test]
async fn test_watchonly_accounts_load_on_startup() {
    let test = TestBackend::new();
    test.register_default().await;
    test.backend.set_watchonly(TEST_FINGERPRINT, true).unwrap();

    let reopened = test.reopen();
    assert_eq!(reopened.codes().len(), 3);
    assert!(reopened.backend.keystore().is_none());
}

#[tokio::test]
async fn test_set_watchonly_unknown_keystore() {
    let test = TestBackend::new();
    let result = test.backend.set_watchonly(fingerprint(0x01), true);
    assert!(matches!(result, Err(BackendError::KeystoreNotFound(_))));
}

#[tokio::test]
async fn test_set_backup_reminder() {
    let test = TestBackend::new();
    test.register_default().await;
    test.backend
        .set_backup_reminder(TEST_FINGERPRINT, false)
        .unwrap();
    let keystore = test
        .backend
        .config()
        .accounts()
        .lookup_keystore(TEST_FINGERPRINT)
        .cloned()
        .unwrap();
    assert!(!keystore.backup_reminder_allowed);
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_accounts_of_other_networks_are_skipped() {
    let test = TestBackend::new();
    test.persist(vec![test_account(TEST_FINGERPRINT, Coin::Tbtc, 0)]);
    test.register_default().await;

    assert!(test.persisted_codes().contains(&"v0-55555555-tbtc-0".to_string()));
    assert!(!test.codes().contains(&"v0-55555555-tbtc-0".to_string()));
}

#[tokio::test]
async fn test_testnet_backend_loads_testnet_defaults() {
    let test = TestBackend::with_network(Network::Testnet);
    test.register_default().await;
    assert_eq!(
        test.codes(),
        vec![
            "v0-55555555-tbtc-0",
            "v0-55555555-tltc-0",
            "v0-55555555-sepeth-0"
        ]
    );
}

#[tokio::test]
async fn test_backend_failure_skips_account() {
    let temp_dir = TempDir::new().unwrap();
    let factory = MockAccountFactory::default();
    factory.broken.lock().insert(code("v0-55555555-ltc-0"));
    let test = TestBackend::open(temp_dir, Network::Mainnet, factory);
    test.register_default().await;

    assert_eq!(test.persisted_codes().len(), 3);
    assert_eq!(test.codes(), vec!["v0-55555555-btc-0", "v0-55555555-eth-0"]);
}

#[tokio::test]
async fn test_accounts_sorted_by_coin_and_number() {
    let test = TestBackend::new();
    test.persist(vec![
        test_account(TEST_FINGERPRINT, Coin::Eth, 0),
        test_account(TEST_FINGERPRINT, Coin::Btc, 1),
        test_account(TEST_FINGERPRINT, Coin::Ltc, 0),
        test_account(TEST_FINGERPRINT, Coin::Btc, 0),
    ]);
    test.register_default().await;

    assert_eq!(
        test.codes(),
        vec![
            "v0-55555555-btc-0",
            "v0-55555555-btc-1",
            "v0-55555555-ltc-0",
            "v0-55555555-eth-0"
        ]
    );
}

#[tokio::test]
async fn test_erc20_sub_accounts_follow_parent() {
    let test = TestBackend::new();
    let mut eth = test_account(TEST_FINGERPRINT, Coin::Eth, 0);
    eth.active_tokens = vec![
        "eth-erc20-usdt".to_string(),
        "eth-erc20-unknown".to_string(),
        "eth-erc20-link".to_string(),
    ];
    test.persist(vec![eth, test_account(TEST_FINGERPRINT, Coin::Eth, 1)]);
    test.register_default().await;

    assert_eq!(
        test.codes(),
        vec![
            "v0-55555555-eth-0",
            "v0-55555555-eth-0-eth-erc20-link",
            "v0-55555555-eth-0-eth-erc20-usdt",
            "v0-55555555-eth-1"
        ]
    );
    let usdt = test
        .backend
        .lookup_account(&code("v0-55555555-eth-0-eth-erc20-usdt"))
        .unwrap();
    let config = usdt.config();
    assert_eq!(config.name, "Tether USD");
    assert_eq!(config.parent, Some(code("v0-55555555-eth-0")));
    assert!(config.is_erc20());
    // Sub-accounts are never persisted.
    assert_eq!(test.persisted_codes().len(), 2);
}

#[tokio::test]
async fn test_deactivating_parent_keeps_erc20_sub_account() {
    let test = TestBackend::new();
    test.register_default().await;
    let eth = code("v0-55555555-eth-0");
    let usdt = code("v0-55555555-eth-0-eth-erc20-usdt");
    test.backend
        .set_token_active(&eth, "eth-erc20-usdt", true)
        .unwrap();

    test.backend.set_account_active(&eth, false).unwrap();

    let sub = test.backend.lookup_account(&usdt).unwrap();
    assert!(sub.config().inactive);
    assert!(!sub.config().is_visible());
    assert!(test.codes().contains(&usdt.to_string()));

    test.backend.set_account_active(&eth, true).unwrap();

    let sub = test.backend.lookup_account(&usdt).unwrap();
    assert!(!sub.config().inactive);
    assert!(sub.config().is_visible());
    assert_eq!(sub.config().parent, Some(eth));
}

#[tokio::test]
async fn test_account_factory_may_write_catalogue() {
    let test = TestBackend::new();
    let weak = Arc::downgrade(&test.backend);
    let hook: MakeHook = Arc::new(move |_config: &AccountConfig| {
        if let Some(backend) = weak.upgrade() {
            backend
                .config()
                .modify_accounts(|_| Ok::<_, ConfigError>(()))
                .unwrap();
        }
    });
    *test.factory.on_make.lock() = Some(hook);

    test.register_default().await;

    assert_eq!(test.codes().len(), 3);
}

#[tokio::test]
async fn test_rebuild_closes_replaced_accounts() {
    let test = TestBackend::new();
    test.register_default().await;
    let before = test.backend.lookup_account(&code("v0-55555555-btc-0")).unwrap();

    test.backend
        .set_account_active(&code("v0-55555555-ltc-0"), false)
        .unwrap();

    assert!(before.is_closed());
    let after = test.backend.lookup_account(&code("v0-55555555-btc-0")).unwrap();
    assert!(!after.is_closed());
}

// ============================================================================
// Account events
// ============================================================================

#[tokio::test]
async fn test_account_events_are_forwarded() {
    let mut test = TestBackend::new();
    test.register_default().await;
    test.drain_events();

    test.factory
        .backend("v0-55555555-eth-0")
        .fire(AccountEvent::StatusChanged);

    let events = test.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subject, "account/v0-55555555-eth-0/status-changed");
}

#[tokio::test]
async fn test_init_account() {
    let test = TestBackend::new();
    test.register_default().await;

    test.backend
        .init_account(&code("v0-55555555-btc-0"))
        .await
        .unwrap();
    let account = test.backend.lookup_account(&code("v0-55555555-btc-0")).unwrap();
    assert!(account.initialized());

    let missing = test.backend.init_account(&code("v0-55555555-btc-9")).await;
    assert!(matches!(missing, Err(BackendError::AccountNotFound(_))));
}

#[tokio::test]
async fn test_failed_initialization_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let factory = MockAccountFactory::default();
    factory.failing.lock().insert(code("v0-55555555-btc-0"));
    let test = TestBackend::open(temp_dir, Network::Mainnet, factory);
    test.register_default().await;

    let result = test.backend.init_account(&code("v0-55555555-btc-0")).await;
    assert!(result.is_err());
    let account = test.backend.lookup_account(&code("v0-55555555-btc-0")).unwrap();
    assert!(account.fatal_error());
}

#[tokio::test]
async fn test_close_releases_everything() {
    let test = TestBackend::new();
    let keystore = test.register_default().await;
    test.backend.close();

    assert!(test.codes().is_empty());
    assert!(keystore.closed.load(Ordering::SeqCst));
    assert!(test.factory.backend("v0-55555555-btc-0").closed.load(Ordering::SeqCst));
}
