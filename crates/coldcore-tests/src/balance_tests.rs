//! Balance aggregation tests.

use crate::generators::*;
use crate::harness::*;
use chrono::Utc;
use coldcore_signing::{Coin, Network};
use num_bigint::BigUint;
use num_rational::BigRational;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

const BTC: u64 = 100_000_000;

/// Registered backend with 1.5 BTC on btc-0 and 2 LTC on ltc-0.
async fn funded() -> TestBackend {
    let temp_dir = TempDir::new().unwrap();
    let factory = MockAccountFactory::default();
    factory.set_balance("v0-55555555-btc-0", BTC + BTC / 2);
    factory.set_balance("v0-55555555-ltc-0", 2 * BTC);
    let test = TestBackend::open(temp_dir, Network::Mainnet, factory);
    test.rates.set_price("BTC", 20_000.0);
    test.rates.set_price("LTC", 75.5);
    test.rates.set_price("ETH", 1_000.0);
    test.register_default().await;
    test
}

fn units(amount: u64) -> BigUint {
    BigUint::from(amount)
}

#[tokio::test]
async fn test_keystores_balance() {
    let test = funded().await;

    let balances = test.backend.keystores_balance("USD").await.unwrap();

    assert_eq!(balances.len(), 1);
    let balance = &balances["55555555"];
    assert_eq!(balance.fiat_total_formatted, "30151.00");
    assert_eq!(
        balance.fiat_total,
        BigRational::from_integer(30_151.into())
    );
    assert_eq!(balance.coins_balance["btc"], units(BTC + BTC / 2));
    assert_eq!(balance.coins_balance["ltc"], units(2 * BTC));
    assert_eq!(balance.coins_balance["eth"], units(0));

    let json = serde_json::to_value(balance).unwrap();
    assert_eq!(json["fiatTotalFormatted"], "30151.00");
    assert!(json.get("fiatTotal").is_none());
}

#[tokio::test]
async fn test_inactive_hidden_and_failed_accounts_excluded() {
    let test = funded().await;
    test.backend
        .set_account_active(&code("v0-55555555-ltc-0"), false)
        .unwrap();
    test.factory.set_balance("v0-55555555-btc-1", BTC);
    test.backend.maybe_add_hidden_accounts().await.unwrap();
    test.factory
        .backend("v0-55555555-eth-0")
        .fatal
        .store(true, Ordering::SeqCst);

    let balances = test.backend.keystores_balance("USD").await.unwrap();
    let balance = &balances["55555555"];

    assert_eq!(balance.fiat_total_formatted, "30000.00");
    assert_eq!(balance.coins_balance.len(), 1);
    assert_eq!(balance.coins_balance["btc"], units(BTC + BTC / 2));
}

#[tokio::test]
async fn test_balance_grouped_per_keystore() {
    let test = funded().await;
    test.backend.set_watchonly(TEST_FINGERPRINT, true).unwrap();
    test.factory.set_balance("v0-66666666-btc-0", BTC / 4);
    test.register(MockKeystore::new(fingerprint(0x66)).arc()).await;

    let grouped = test.backend.accounts_by_keystore();
    assert_eq!(
        grouped.keys().cloned().collect::<Vec<_>>(),
        vec!["55555555", "66666666"]
    );
    assert_eq!(grouped["66666666"].len(), 3);

    let balances = test.backend.keystores_balance("USD").await.unwrap();
    assert_eq!(balances["55555555"].fiat_total_formatted, "30151.00");
    assert_eq!(balances["66666666"].fiat_total_formatted, "5000.00");
}

#[tokio::test]
async fn test_missing_rate_fails() {
    let test = funded().await;
    test.rates.fail.store(true, Ordering::SeqCst);
    assert!(test.backend.keystores_balance("USD").await.is_err());
}

#[tokio::test]
async fn test_fiat_rounding() {
    let temp_dir = TempDir::new().unwrap();
    let factory = MockAccountFactory::default();
    // 0.00012345 BTC at 33333.33 = 4.1149995885
    factory.set_balance("v0-55555555-btc-0", 12_345);
    let test = TestBackend::open(temp_dir, Network::Mainnet, factory);
    test.rates.set_price("BTC", 33_333.33);
    let mut keystore = MockKeystore::default();
    keystore.unsupported_coins = vec![Coin::Ltc, Coin::Eth];
    test.register(keystore.arc()).await;

    let balances = test.backend.keystores_balance("EUR").await.unwrap();
    assert_eq!(balances["55555555"].fiat_total_formatted, "4.11");
}

#[tokio::test]
async fn test_coins_total_balance() {
    let test = funded().await;
    let keystore = MockKeystore::default();
    test.factory.set_balance("v0-55555555-btc-1", BTC / 2);
    test.backend
        .create_and_persist_account(Coin::Btc, "Second", &keystore)
        .await
        .unwrap();
    test.factory
        .set_balance("v0-55555555-eth-0-eth-erc20-usdt", 12_500_000);
    test.backend
        .set_token_active(&code("v0-55555555-eth-0"), "eth-erc20-usdt", true)
        .unwrap();

    let totals = test.backend.coins_total_balance().await.unwrap();

    let codes: Vec<_> = totals.iter().map(|t| t.coin_code.as_str()).collect();
    assert_eq!(codes, vec!["btc", "ltc", "eth", "eth-erc20-usdt"]);
    assert_eq!(totals[0].amount, units(2 * BTC));
    assert_eq!(totals[0].formatted, "2");
    assert_eq!(totals[0].coin_name, "Bitcoin");
    assert_eq!(totals[1].formatted, "2");
    assert_eq!(totals[2].formatted, "0");
    assert_eq!(totals[3].formatted, "12.5");
}

#[tokio::test]
async fn test_fiat_value_at() {
    let test = funded().await;
    let amount = units(BTC / 10);

    let none = test
        .backend
        .fiat_value_at(Coin::Btc, &amount, "USD", Utc::now())
        .unwrap();
    assert_eq!(none, BigRational::from_integer(0.into()));

    test.rates.historical.lock().insert("BTC".to_string());
    let value = test
        .backend
        .fiat_value_at(Coin::Btc, &amount, "USD", Utc::now())
        .unwrap();
    assert_eq!(value, BigRational::from_integer(2_000.into()));
}

#[tokio::test]
async fn test_chart_data_missing() {
    let test = funded().await;
    assert!(test.backend.chart_data_missing());

    {
        let mut historical = test.rates.historical.lock();
        historical.insert("BTC".to_string());
        historical.insert("LTC".to_string());
    }
    assert!(test.backend.chart_data_missing());

    test.rates.historical.lock().insert("ETH".to_string());
    assert!(!test.backend.chart_data_missing());
}
