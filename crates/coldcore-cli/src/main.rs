//! coldcore - maintenance command line for the wallet backend.
//!
//! Works on the data directory without a keystore or chain access: list and
//! edit accounts, run migrations, export and import notes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coldcore_backend::Backend;
use coldcore_signing::{AccountCode, Network, RootFingerprint};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod offline;

use config::CliConfig;

fn parse_network(s: &str) -> Result<Network, String> {
    match s.to_lowercase().as_str() {
        "mainnet" => Ok(Network::Mainnet),
        "testnet" => Ok(Network::Testnet),
        "regtest" => Ok(Network::Regtest),
        other => Err(format!("unknown network: {}", other)),
    }
}

/// Wallet backend maintenance tool.
#[derive(Parser, Debug)]
#[command(name = "coldcore")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "coldcore.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Network: mainnet, testnet or regtest
    #[arg(short, long, value_parser = parse_network)]
    network: Option<Network>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List persisted accounts and keystores
    Accounts,
    /// Load the data directory, running schema migrations
    Migrate,
    /// Rename an account
    Rename { code: String, name: String },
    /// Activate or deactivate an account
    SetActive {
        code: String,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Keep a keystore's accounts loaded while it is disconnected
    Watchonly {
        fingerprint: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Export notes of loaded accounts (BIP-329)
    NotesExport {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Import notes (BIP-329)
    NotesImport { input: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = CliConfig::load(&args.config, &args)?;

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("coldcore v{}", env!("CARGO_PKG_VERSION"));
    info!("Network: {}", config.backend.network);
    info!("Data directory: {:?}", config.backend.data_dir);

    let output = match &args.command {
        Command::NotesExport { output } => Some(output.clone()),
        _ => None,
    };
    let (backend, _events) = Backend::new(config.backend.clone(), offline::collaborators(output))
        .context("Failed to open data directory")?;

    match args.command {
        Command::Accounts => print_accounts(&backend),
        Command::Migrate => info!("Data directory is up to date"),
        Command::Rename { code, name } => {
            backend.rename_account(&AccountCode::new(code), &name)?;
        }
        Command::SetActive { code, active } => {
            backend.set_account_active(&AccountCode::new(code), active)?;
        }
        Command::Watchonly {
            fingerprint,
            enabled,
        } => {
            let fingerprint: RootFingerprint = fingerprint
                .parse()
                .context("Invalid keystore fingerprint")?;
            backend.set_watchonly(fingerprint, enabled)?;
        }
        Command::NotesExport { .. } => {
            if let Some(path) = backend.export_notes_to_file()? {
                println!("{}", path.display());
            }
        }
        Command::NotesImport { input } => {
            let data = std::fs::read(&input).context("Failed to read notes file")?;
            let result = backend.import_notes(&data).await?;
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    backend.close();
    Ok(())
}

fn print_accounts(backend: &Backend) {
    let accounts = backend.config().accounts();
    let loaded = backend.accounts();
    for account in &accounts.accounts {
        let mut flags = Vec::new();
        if account.inactive {
            flags.push("inactive");
        }
        if account.hidden_because_unused {
            flags.push("hidden");
        }
        if account.used {
            flags.push("used");
        }
        if loaded.iter().any(|live| live.code() == account.code) {
            flags.push("loaded");
        }
        println!(
            "{:<32} {:<6} {:<24} {}",
            account.code.as_str(),
            account.coin_code,
            account.name,
            flags.join(",")
        );
        for token in &account.active_tokens {
            println!("  {}", token);
        }
    }
    for keystore in &accounts.keystores {
        println!(
            "keystore {} {:<24} watchonly={} last_connected={}",
            keystore.root_fingerprint,
            keystore.name,
            keystore.watchonly,
            keystore.last_connected.to_rfc3339()
        );
    }
}
