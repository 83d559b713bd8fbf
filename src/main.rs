use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use walletd::application::engine::{LedgerEngine, TransactionRequest};
use walletd::config::LedgerConfig;
use walletd::domain::clock::SystemClock;
use walletd::domain::ports::{OtpNotifierBox, TransactionStoreBox, WalletStoreBox};
use walletd::domain::wallet::{WalletId, WalletLimits};
use walletd::error::LedgerError;
use walletd::infrastructure::flat_file::FlatFileStore;
use walletd::interfaces::console::ConsoleNotifier;
use walletd::logging::init_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding wallets.txt and transactions.txt
    #[arg(long, default_value = "walletd-data")]
    data_dir: PathBuf,

    /// JSON config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a wallet with the default limits
    Open { id: String },
    /// Print a wallet's state and completed transactions
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Print every wallet's balance
    List,
    /// Add funds to a wallet
    Deposit {
        id: String,
        amount: Decimal,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Take funds out of a wallet
    Withdraw {
        id: String,
        amount: Decimal,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Move funds between two wallets
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Change a wallet's limits
    Limits {
        id: String,
        #[arg(long)]
        daily_limit: Decimal,
        #[arg(long)]
        max_balance: Decimal,
    },
    /// Copy the data files into a new backup directory
    Backup,
    /// Replace the data files with a backup's
    Restore { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = LedgerConfig::load(cli.config.as_deref()).into_diagnostic()?;
    init_logging(&config.log_level);

    let store = FlatFileStore::open(&cli.data_dir, config.otp_ttl()).into_diagnostic()?;

    match &cli.command {
        Command::Backup => {
            let dir = store.backup().await.into_diagnostic()?;
            println!("{}", dir.display());
            return Ok(());
        }
        Command::Restore { dir } => {
            store.restore(dir).await.into_diagnostic()?;
            println!("restored from {}", dir.display());
            return Ok(());
        }
        _ => {}
    }

    let ws_store: WalletStoreBox = Box::new(store.clone());
    let ts_store: TransactionStoreBox = Box::new(store);
    let notifier: OtpNotifierBox = Box::new(ConsoleNotifier::new());
    let engine = LedgerEngine::new(&config, Arc::new(SystemClock), ws_store, ts_store, notifier);
    engine.load().await.into_diagnostic()?;

    match cli.command {
        Command::Open { id } => {
            let snapshot = engine.open_wallet(wallet_id(id)?).await.into_diagnostic()?;
            println!("opened {}", snapshot.id);
        }
        Command::Show { id, json } => show(&engine, wallet_id(id)?, json).await?,
        Command::List => {
            for snapshot in engine.snapshots() {
                println!("{}|{}", snapshot.id, snapshot.balance);
            }
        }
        Command::Deposit {
            id,
            amount,
            description,
        } => {
            let request =
                TransactionRequest::deposit(wallet_id(id)?, amount).with_description(description);
            run_transaction(&engine, request).await?;
        }
        Command::Withdraw {
            id,
            amount,
            description,
        } => {
            let request =
                TransactionRequest::withdraw(wallet_id(id)?, amount).with_description(description);
            run_transaction(&engine, request).await?;
        }
        Command::Transfer {
            from,
            to,
            amount,
            description,
        } => {
            let request = TransactionRequest::transfer(wallet_id(from)?, wallet_id(to)?, amount)
                .with_description(description);
            run_transaction(&engine, request).await?;
        }
        Command::Limits {
            id,
            daily_limit,
            max_balance,
        } => {
            let limits = WalletLimits {
                daily_transfer_limit: daily_limit,
                max_balance,
            };
            let snapshot = engine
                .set_limits(&wallet_id(id)?, limits)
                .await
                .into_diagnostic()?;
            println!(
                "{} daily_limit={} max_balance={}",
                snapshot.id, snapshot.daily_transfer_limit, snapshot.max_balance
            );
        }
        Command::Backup | Command::Restore { .. } => {}
    }

    Ok(())
}

fn wallet_id(id: String) -> Result<WalletId> {
    WalletId::new(id).into_diagnostic()
}

async fn show(engine: &LedgerEngine, id: WalletId, json: bool) -> Result<()> {
    let snapshot = engine.snapshot(&id).into_diagnostic()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot).into_diagnostic()?);
        return Ok(());
    }

    println!("wallet: {}", snapshot.id);
    println!("balance: {}", snapshot.balance);
    println!("daily transfer limit: {}", snapshot.daily_transfer_limit);
    println!("max balance: {}", snapshot.max_balance);
    println!("transfers in window: {}", snapshot.daily_transfer_count);
    println!("window started: {}", snapshot.last_transfer_reset.to_rfc3339());
    for tx in engine.history(&id).await.into_diagnostic()? {
        let counterpart = tx
            .destination()
            .map(|destination| format!(" -> {destination}"))
            .unwrap_or_default();
        println!(
            "  {} {} {}{} {} {}",
            tx.id(),
            tx.kind(),
            tx.source(),
            counterpart,
            tx.amount(),
            tx.description()
        );
    }
    Ok(())
}

/// Submits the request, asks for the delivered code on stdin and confirms with it.
/// A wrong or expired code cancels the transaction.
async fn run_transaction(engine: &LedgerEngine, request: TransactionRequest) -> Result<()> {
    let mut tx = engine.submit(request).await.into_diagnostic()?;
    eprintln!("Enter the one-time code for transaction {}:", tx.id());

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .into_diagnostic()?;

    let outcome = engine.confirm(&mut tx, line.trim()).await;
    if let Err(LedgerError::OtpMismatch | LedgerError::OtpExpired) = &outcome {
        engine.cancel(&mut tx).await;
    }
    println!("{} {}", tx.id(), tx.status());
    outcome.into_diagnostic()
}
