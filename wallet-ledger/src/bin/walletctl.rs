//! Wallet ledger command-line client
//!
//! Runs one ledger operation against a RocksDB data directory and prints the
//! result as JSON (CSV for `export --format csv`). Failures print a JSON error
//! body and exit with status 2 for caller errors, 1 for everything else.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use wallet_ledger::{parse_wallet_id, Amount, Export, ExportFormat, LedgerConfig, WalletLedger};

#[derive(Parser)]
#[command(name = "walletctl", about = "Wallet ledger command-line client")]
struct Cli {
    /// RocksDB data directory (overrides config and WALLET_LEDGER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML config file (default: environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assign a new wallet
    Assign,

    /// Show a wallet's balance
    Balance { wallet_id: String },

    /// Credit a wallet
    Credit {
        wallet_id: String,
        amount: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Debit a wallet
    Debit {
        wallet_id: String,
        amount: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// List transactions, newest first
    Transactions {
        wallet_id: String,
        #[arg(long)]
        limit: Option<String>,
        #[arg(long)]
        offset: Option<String>,
    },

    /// Zero the balance and clear the history
    Reset { wallet_id: String },

    /// Delete the wallet and its history
    Delete { wallet_id: String },

    /// Show totals derived from the history
    Summary { wallet_id: String },

    /// Export the full history
    Export {
        wallet_id: String,
        /// json or csv
        #[arg(long)]
        format: Option<String>,
        /// Write CSV to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Replay the history and check it against the stored balance
    Verify { wallet_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{}", error_body(&err));
            match err.downcast_ref::<wallet_ledger::Error>() {
                Some(e) if e.is_client_error() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LedgerConfig::from_env().context("loading config from environment")?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let ledger = WalletLedger::open(config)?;

    let result = execute(&ledger, cli.command).await;
    ledger.shutdown().await?;
    result
}

async fn execute(ledger: &WalletLedger, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Assign => print_json(&ledger.create_wallet().await?),
        Command::Balance { wallet_id } => {
            print_json(&ledger.get_balance(parse_wallet_id(&wallet_id)?).await?)
        }
        Command::Credit {
            wallet_id,
            amount,
            reason,
        } => {
            let wallet_id = parse_wallet_id(&wallet_id)?;
            let amount: Amount = amount.parse()?;
            print_json(&ledger.credit(wallet_id, amount, reason).await?)
        }
        Command::Debit {
            wallet_id,
            amount,
            reason,
        } => {
            let wallet_id = parse_wallet_id(&wallet_id)?;
            let amount: Amount = amount.parse()?;
            print_json(&ledger.debit(wallet_id, amount, reason).await?)
        }
        Command::Transactions {
            wallet_id,
            limit,
            offset,
        } => {
            let wallet_id = parse_wallet_id(&wallet_id)?;
            let page = ledger.page_request(limit.as_deref(), offset.as_deref());
            print_json(&ledger.get_transactions(wallet_id, page).await?)
        }
        Command::Reset { wallet_id } => {
            print_json(&ledger.reset(parse_wallet_id(&wallet_id)?).await?)
        }
        Command::Delete { wallet_id } => {
            print_json(&ledger.delete(parse_wallet_id(&wallet_id)?).await?)
        }
        Command::Summary { wallet_id } => {
            print_json(&ledger.get_summary(parse_wallet_id(&wallet_id)?).await?)
        }
        Command::Export {
            wallet_id,
            format,
            output,
        } => {
            let wallet_id = parse_wallet_id(&wallet_id)?;
            let format = ExportFormat::parse_lenient(format.as_deref());
            match ledger.export(wallet_id, format).await? {
                Export::Records(record) => print_json(&record),
                Export::Csv(csv) => {
                    match output {
                        Some(path) => {
                            std::fs::write(&path, &csv.body)
                                .with_context(|| format!("writing {}", path.display()))?;
                            tracing::info!(path = %path.display(), "CSV export written");
                        }
                        None => println!("{}", csv.body),
                    }
                    Ok(())
                }
            }
        }
        Command::Verify { wallet_id } => {
            let wallet_id = parse_wallet_id(&wallet_id)?;
            ledger.verify_history(wallet_id).await?;
            print_json(&json!({ "wallet_id": wallet_id, "consistent": true }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn error_body(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<wallet_ledger::Error>() {
        Some(wallet_ledger::Error::InsufficientFunds {
            current_balance,
            requested_amount,
        }) => json!({
            "error": "Insufficient funds",
            "current_balance": current_balance,
            "requested_amount": requested_amount,
        }),
        Some(e) if e.is_client_error() => json!({ "error": e.client_message() }),
        Some(e) => json!({
            "error": e.client_message(),
            "detail": format!("{:#}", err),
        }),
        None => json!({ "error": format!("{:#}", err) }),
    }
}
