//! CLI configuration.

use crate::Args;
use anyhow::{Context, Result};
use coldcore_backend::BackendOptions;
use coldcore_signing::Network;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_log_level() -> String {
    "info".to_string()
}

/// Contents of `coldcore.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub backend: BackendOptions,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl CliConfig {
    /// Load from `config_path` if it exists, then apply command line overrides.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default_for_network(args.network.unwrap_or_default())
        };

        if let Some(ref data_dir) = args.data_dir {
            config.backend.data_dir = data_dir.clone();
        }
        if let Some(network) = args.network {
            config.backend.network = network;
        }
        if let Some(ref log_level) = args.log_level {
            config.log_level = log_level.clone();
        }
        Ok(config)
    }

    pub fn default_for_network(network: Network) -> Self {
        let data_dir = match network {
            Network::Mainnet => PathBuf::from(".coldcore"),
            Network::Testnet => PathBuf::from(".coldcore-testnet"),
            Network::Regtest => PathBuf::from(".coldcore-regtest"),
        };
        Self {
            backend: BackendOptions::new(data_dir).with_network(network),
            log_level: default_log_level(),
        }
    }
}
