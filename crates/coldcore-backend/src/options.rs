//! Backend options.

use coldcore_signing::{Coin, Network};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_connect_timeout_secs() -> u64 {
    300
}

fn default_aopp_sync_poll_ms() -> u64 {
    1000
}

/// Startup options, fixed for the lifetime of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Directory holding `accounts.json`, `app.json` and `notes/`.
    pub data_dir: PathBuf,
    /// Which coins are loaded.
    #[serde(default)]
    pub network: Network,
    /// How long a connect-keystore request waits.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Polling interval while AOPP waits for an account to sync.
    #[serde(default = "default_aopp_sync_poll_ms")]
    pub aopp_sync_poll_ms: u64,
}

impl BackendOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            network: Network::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
            aopp_sync_poll_ms: default_aopp_sync_poll_ms(),
        }
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn aopp_sync_poll(&self) -> Duration {
        Duration::from_millis(self.aopp_sync_poll_ms)
    }

    /// Coins created for a keystore seen for the first time, in order.
    pub fn default_coins(&self) -> &'static [Coin] {
        match self.network {
            Network::Mainnet => &[Coin::Btc, Coin::Ltc, Coin::Eth],
            Network::Testnet => &[Coin::Tbtc, Coin::Tltc, Coin::Sepeth],
            Network::Regtest => &[Coin::Rbtc],
        }
    }

    /// Coins scanned for used accounts.
    pub fn discovery_coins(&self) -> &'static [Coin] {
        match self.network {
            Network::Mainnet => &[Coin::Btc, Coin::Ltc],
            Network::Testnet => &[Coin::Tbtc, Coin::Tltc],
            Network::Regtest => &[Coin::Rbtc],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: BackendOptions = serde_json::from_str(r#"{"data_dir": "/tmp/x"}"#).unwrap();
        assert_eq!(options, BackendOptions::new("/tmp/x"));
        assert_eq!(options.connect_timeout(), Duration::from_secs(300));
        assert_eq!(options.aopp_sync_poll(), Duration::from_secs(1));
        assert_eq!(options.default_coins(), &[Coin::Btc, Coin::Ltc, Coin::Eth]);
    }

    #[test]
    fn test_testnet_coins() {
        let options = BackendOptions::new("/tmp/x").with_network(Network::Testnet);
        assert_eq!(options.discovery_coins(), &[Coin::Tbtc, Coin::Tltc]);
        assert!(options.default_coins().iter().all(|c| c.network() == Network::Testnet));
    }
}
