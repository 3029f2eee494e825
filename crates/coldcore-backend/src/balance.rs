//! Balance aggregation per keystore and per coin.

use crate::{Backend, BackendError, BackendResult, CollaboratorError};
use chrono::{DateTime, Utc};
use coldcore_accounts::LiveAccount;
use coldcore_signing::Coin;
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Total of one keystore.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreBalance {
    /// Sum over all included accounts in the requested fiat.
    #[serde(skip)]
    pub fiat_total: BigRational,
    pub fiat_total_formatted: String,
    /// Per coin code, in the smallest unit.
    pub coins_balance: BTreeMap<String, BigUint>,
}

/// Total of one coin across all keystores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinTotal {
    pub coin_code: String,
    pub coin_name: String,
    pub amount: BigUint,
    pub formatted: String,
}

/// Amount in the coin's unit as an exact fraction.
fn to_unit(coin: Coin, amount: &BigUint) -> BigRational {
    BigRational::new(
        BigInt::from(amount.clone()),
        BigInt::from(10u32).pow(coin.decimals()),
    )
}

fn rational_from_price(price: f64) -> BackendResult<BigRational> {
    BigRational::from_float(price)
        .ok_or_else(|| BackendError::from(CollaboratorError(format!("invalid price {}", price))))
}

/// Format a fiat value with two decimals, rounding half away from zero.
pub fn format_fiat(value: &BigRational) -> String {
    let cents = (value * BigRational::from_integer(BigInt::from(100)))
        .round()
        .to_integer();
    let sign = if cents.is_negative() { "-" } else { "" };
    let cents = cents.abs();
    let whole = &cents / BigInt::from(100);
    let fraction = (&cents % BigInt::from(100)).to_u32().unwrap_or(0);
    format!("{}{}.{:02}", sign, whole, fraction)
}

/// Counted in totals: active, not hidden, without a fatal error.
fn included(account: &LiveAccount) -> bool {
    account.config().is_visible() && !account.fatal_error()
}

impl Backend {
    /// Live accounts grouped by keystore fingerprint (hex), in registry order.
    pub fn accounts_by_keystore(&self) -> BTreeMap<String, Vec<Arc<LiveAccount>>> {
        let mut grouped: BTreeMap<String, Vec<Arc<LiveAccount>>> = BTreeMap::new();
        for account in self.accounts() {
            let fingerprint = account.config().root_fingerprint.to_hex();
            grouped.entry(fingerprint).or_default().push(account);
        }
        grouped
    }

    /// Available balance of `account` in `fiat`.
    pub async fn account_fiat_balance(
        &self,
        account: &LiveAccount,
        fiat: &str,
    ) -> BackendResult<BigRational> {
        let coin = account.coin();
        let balance = account.balance().await?;
        let price = self
            .collaborators
            .rates
            .latest_price_for_pair(coin.unit(), fiat)?;
        Ok(to_unit(coin, &balance.available) * rational_from_price(price)?)
    }

    /// Fiat value of `amount` at `time`, 0 if no historical rate is known.
    pub fn fiat_value_at(
        &self,
        coin: Coin,
        amount: &BigUint,
        fiat: &str,
        time: DateTime<Utc>,
    ) -> BackendResult<BigRational> {
        let price = self.collaborators.rates.price_at(coin.unit(), fiat, time);
        Ok(to_unit(coin, amount) * rational_from_price(price)?)
    }

    /// Per-keystore fiat totals and per-coin balances.
    ///
    /// Any balance or rate error fails the whole call.
    pub async fn keystores_balance(
        &self,
        fiat: &str,
    ) -> BackendResult<BTreeMap<String, KeystoreBalance>> {
        let mut result = BTreeMap::new();
        for (fingerprint, accounts) in self.accounts_by_keystore() {
            let mut fiat_total = BigRational::zero();
            let mut coins_balance: BTreeMap<String, BigUint> = BTreeMap::new();
            for account in accounts.iter().filter(|a| included(a)) {
                fiat_total += self.account_fiat_balance(account, fiat).await?;
                let available = account
                    .balance_snapshot()
                    .map(|b| b.available)
                    .unwrap_or_default();
                *coins_balance
                    .entry(account.coin().code().to_string())
                    .or_default() += available;
            }
            result.insert(
                fingerprint,
                KeystoreBalance {
                    fiat_total_formatted: format_fiat(&fiat_total),
                    fiat_total,
                    coins_balance,
                },
            );
        }
        Ok(result)
    }

    /// Balance per coin across all keystores, in coin order.
    pub async fn coins_total_balance(&self) -> BackendResult<Vec<CoinTotal>> {
        let mut totals: BTreeMap<(u64, bool, &'static str), (Coin, BigUint)> = BTreeMap::new();
        for account in self.accounts().iter().filter(|a| included(a)) {
            let coin = account.coin();
            let balance = account.balance().await?;
            totals
                .entry((coin.sort_rank(), coin.is_erc20(), coin.code()))
                .or_insert_with(|| (coin, BigUint::zero()))
                .1 += balance.available;
        }
        Ok(totals
            .into_values()
            .map(|(coin, amount)| CoinTotal {
                coin_code: coin.code().to_string(),
                coin_name: coin.name().to_string(),
                formatted: coin.format_amount(&amount),
                amount,
            })
            .collect())
    }

    /// True if a coin of a loaded account has no historical rates yet.
    pub fn chart_data_missing(&self) -> bool {
        let rates = &self.collaborators.rates;
        self.accounts()
            .iter()
            .filter(|a| included(a))
            .any(|account| !rates.historical_data_available(account.coin().unit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rational(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn test_format_fiat() {
        assert_eq!(format_fiat(&rational(0, 1)), "0.00");
        assert_eq!(format_fiat(&rational(12345, 100)), "123.45");
        assert_eq!(format_fiat(&rational(1, 3)), "0.33");
        assert_eq!(format_fiat(&rational(2, 3)), "0.67");
        assert_eq!(format_fiat(&rational(1, 200)), "0.01");
        assert_eq!(format_fiat(&rational(-5, 2)), "-2.50");
    }

    #[test]
    fn test_to_unit() {
        let one_btc = BigUint::from(100_000_000u64);
        assert_eq!(to_unit(Coin::Btc, &one_btc), rational(1, 1));
        let half_eth = BigUint::from(500_000_000_000_000_000u64);
        assert_eq!(to_unit(Coin::Eth, &half_eth), rational(1, 2));
    }

    #[test]
    fn test_rational_from_price() {
        assert_eq!(rational_from_price(0.5).unwrap(), rational(1, 2));
        assert!(rational_from_price(f64::NAN).is_err());
    }
}
