use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walletcore::application::engine::{LedgerEngine, RetryPolicy};
use walletcore::domain::account::AccountId;
use walletcore::domain::ports::AccountStoreRef;
use walletcore::infrastructure::in_memory::InMemoryAccountStore;
#[cfg(feature = "storage-rocksdb")]
use walletcore::infrastructure::rocksdb::RocksDbAccountStore;
use walletcore::interfaces::csv::balance_writer::BalanceWriter;
use walletcore::interfaces::csv::operation_reader::{OpKind, OperationReader, OperationRecord};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Maximum commit attempts per operation
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Base backoff between commit retries, in milliseconds (doubles per attempt)
    #[arg(long, default_value_t = 25)]
    backoff_ms: u64,
}

fn build_store(cli: &Cli) -> Result<AccountStoreRef> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        let store = RocksDbAccountStore::open(db_path).into_diagnostic()?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    let _ = cli;

    Ok(Arc::new(InMemoryAccountStore::new()))
}

async fn apply(engine: &LedgerEngine, record: OperationRecord) -> Result<()> {
    let account = AccountId::new(record.account);
    let amount = record
        .amount
        .ok_or_else(|| miette::miette!("operation row missing amount"))?;

    match record.op {
        OpKind::Open => engine.open_account(account, amount).await.into_diagnostic(),
        OpKind::Deposit => engine
            .deposit(&account, amount)
            .await
            .map(|_| ())
            .into_diagnostic(),
        OpKind::Withdraw => engine
            .withdraw(&account, amount)
            .await
            .map(|_| ())
            .into_diagnostic(),
        OpKind::Transfer => {
            let dest = record
                .to
                .ok_or_else(|| miette::miette!("transfer row missing destination account"))?;
            engine
                .transfer(&account, &AccountId::new(dest), amount)
                .await
                .into_diagnostic()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store = build_store(&cli)?;
    let retry = RetryPolicy {
        max_attempts: cli.max_attempts,
        backoff_base: Duration::from_millis(cli.backoff_ms),
        ..RetryPolicy::default()
    };
    let engine = LedgerEngine::with_retry_policy(store.clone(), retry);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for (index, record) in reader.operations().enumerate() {
        // Header is line 1, first record is line 2.
        let line = index + 2;
        match record {
            Ok(record) => {
                if let Err(e) = apply(&engine, record).await {
                    warn!(line, error = %e, "operation rejected");
                }
            }
            Err(e) => warn!(line, error = %e, "malformed operation row"),
        }
    }

    let accounts = store.all_accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}
