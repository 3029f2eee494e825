//! Property-based tests using proptest.
//!
//! Invariants of account codes, key paths, the catalogue, the registry and
//! fiat formatting over randomly generated inputs.

use crate::generators::*;
use crate::harness::TestBackend;
use coldcore_backend::format_fiat;
use coldcore_config::{Account, AccountsConfig};
use coldcore_signing::{
    default_account_name, default_key_paths, erc20_account_code, regular_account_code,
    AbsoluteKeypath, AccountCode, Coin, RootFingerprint, ERC20_TOKENS,
};
use num_bigint::BigInt;
use num_rational::BigRational;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Strategies
// ============================================================================

fn arb_fingerprint() -> impl Strategy<Value = RootFingerprint> {
    prop::array::uniform4(any::<u8>()).prop_map(RootFingerprint)
}

fn arb_base_coin() -> impl Strategy<Value = Coin> {
    prop::sample::select(Coin::BASE.to_vec())
}

fn arb_account_number() -> impl Strategy<Value = u16> {
    0u16..100
}

fn arb_keypath() -> impl Strategy<Value = AbsoluteKeypath> {
    prop::collection::vec((0u32..0x8000_0000, any::<bool>()), 0..6).prop_map(|nodes| {
        nodes
            .into_iter()
            .fold(AbsoluteKeypath::default(), |path, (index, hardened)| {
                path.child(index, hardened)
            })
    })
}

// ============================================================================
// Codes and paths
// ============================================================================

proptest! {
    #[test]
    fn prop_regular_code_parses_back(
        fp in arb_fingerprint(),
        coin in arb_base_coin(),
        number in arb_account_number(),
    ) {
        let code = regular_account_code(fp, coin, number);
        let (parsed_fp, coin_code, parsed_number) = code.parse_regular().unwrap();
        prop_assert_eq!(parsed_fp, fp);
        prop_assert_eq!(coin_code, coin.code());
        prop_assert_eq!(parsed_number, number);
        prop_assert!(!code.is_erc20());
    }

    #[test]
    fn prop_erc20_code_names_parent(
        fp in arb_fingerprint(),
        number in arb_account_number(),
        token in 0usize..ERC20_TOKENS.len(),
    ) {
        let parent = regular_account_code(fp, Coin::Eth, number);
        let code = erc20_account_code(&parent, ERC20_TOKENS[token].code);
        prop_assert!(code.is_erc20());
        let (parsed_parent, token_code) = code.parse_erc20().unwrap();
        prop_assert_eq!(parsed_parent, parent);
        prop_assert_eq!(token_code, ERC20_TOKENS[token].code);
    }

    #[test]
    fn prop_keypath_text_form(path in arb_keypath()) {
        let text = path.to_string();
        prop_assert!(text.starts_with('m'));
        let parsed: AbsoluteKeypath = text.parse().unwrap();
        prop_assert_eq!(parsed, path);
    }

    #[test]
    fn prop_default_paths_encode_account_number(
        coin in arb_base_coin(),
        number in arb_account_number(),
    ) {
        let paths = default_key_paths(coin, number);
        prop_assert!(!paths.is_empty());
        for (script_type, keypath) in &paths {
            prop_assert_eq!(keypath.account_number().unwrap(), number);
            prop_assert_eq!(script_type.is_none(), coin.is_eth_family());
        }
        // Canonical script type first, each at most once.
        let unique: BTreeSet<_> = paths.iter().map(|(s, _)| s.map(|s| s.purpose())).collect();
        prop_assert_eq!(unique.len(), paths.len());
    }

    #[test]
    fn prop_default_names_are_one_based(number in 1u16..1000) {
        let name = default_account_name("Bitcoin", number);
        prop_assert_eq!(name, format!("Bitcoin {}", number as u32 + 1));
    }
}

// ============================================================================
// Catalogue
// ============================================================================

proptest! {
    #[test]
    fn prop_next_account_number_follows_highest(
        numbers in prop::collection::btree_set(0u16..6, 0..6),
    ) {
        let mut cfg = AccountsConfig::default();
        for &number in &numbers {
            cfg.persist_account(test_account(TEST_FINGERPRINT, Coin::Btc, number)).unwrap();
        }
        let expected = numbers.iter().max().map_or(0, |n| n + 1);
        prop_assert_eq!(cfg.next_account_number(Coin::Btc, TEST_FINGERPRINT), expected);
        // Other keystores and coins are unaffected.
        prop_assert_eq!(cfg.next_account_number(Coin::Ltc, TEST_FINGERPRINT), 0);
        prop_assert_eq!(cfg.next_account_number(Coin::Btc, fingerprint(0x01)), 0);
    }

    #[test]
    fn prop_catalogue_rejects_duplicates(
        numbers in prop::collection::vec(0u16..4, 1..10),
    ) {
        let mut cfg = AccountsConfig::default();
        let mut seen = BTreeSet::new();
        for number in numbers {
            let result = cfg.persist_account(test_account(TEST_FINGERPRINT, Coin::Ltc, number));
            prop_assert_eq!(result.is_ok(), seen.insert(number));
        }
        let codes: BTreeSet<AccountCode> = cfg.accounts.iter().map(|a| a.code.clone()).collect();
        prop_assert_eq!(codes.len(), cfg.accounts.len());
    }

    #[test]
    fn prop_hidden_account_is_lowest_hidden(
        visible in 0u16..5,
        hidden in 1u16..4,
    ) {
        let mut cfg = AccountsConfig::default();
        for number in 0..visible {
            cfg.persist_account(test_account(TEST_FINGERPRINT, Coin::Btc, number)).unwrap();
        }
        for number in visible..visible + hidden {
            cfg.persist_account(hidden_account(TEST_FINGERPRINT, Coin::Btc, number)).unwrap();
        }
        let found = cfg.find_hidden_account(Coin::Btc, TEST_FINGERPRINT).unwrap();
        prop_assert_eq!(found.account_number().unwrap(), visible);
    }
}

// ============================================================================
// Registry
// ============================================================================

fn catalogue_accounts() -> Vec<Account> {
    let mut eth = test_account(TEST_FINGERPRINT, Coin::Eth, 0);
    eth.active_tokens = vec!["eth-erc20-usdt".to_string(), "eth-erc20-link".to_string()];
    vec![
        test_account(TEST_FINGERPRINT, Coin::Btc, 0),
        test_account(TEST_FINGERPRINT, Coin::Btc, 1),
        hidden_account(TEST_FINGERPRINT, Coin::Btc, 2),
        test_account(TEST_FINGERPRINT, Coin::Ltc, 0),
        test_account(TEST_FINGERPRINT, Coin::Ltc, 1),
        eth,
        test_account(TEST_FINGERPRINT, Coin::Eth, 1),
        test_account(fingerprint(0x01), Coin::Btc, 0),
    ]
}

/// Live account codes after registering the default keystore on `accounts`.
fn live_codes(accounts: Vec<Account>) -> Vec<String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let test = TestBackend::new();
        test.persist(accounts);
        test.register_default().await;
        test.codes()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_registry_order_ignores_catalogue_order(
        shuffled in Just(catalogue_accounts()).prop_shuffle(),
    ) {
        prop_assert_eq!(live_codes(shuffled), live_codes(catalogue_accounts()));
    }
}

// ============================================================================
// Fiat formatting
// ============================================================================

proptest! {
    #[test]
    fn prop_whole_cents_format_exactly(cents in -10_000_000i64..10_000_000) {
        let value = BigRational::new(BigInt::from(cents), BigInt::from(100));
        let formatted = format_fiat(&value);
        let sign = if cents < 0 { "-" } else { "" };
        let abs = cents.unsigned_abs();
        prop_assert_eq!(formatted, format!("{}{}.{:02}", sign, abs / 100, abs % 100));
    }

    #[test]
    fn prop_formatting_has_two_decimals(numer in any::<i64>(), denom in 1i64..1_000_000) {
        let value = BigRational::new(BigInt::from(numer), BigInt::from(denom));
        let formatted = format_fiat(&value);
        let (_, decimals) = formatted.split_once('.').unwrap();
        prop_assert_eq!(decimals.len(), 2);
    }
}
