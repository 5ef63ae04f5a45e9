use clap::Parser;
use ledger_core::application::transfer::TransferEngine;
use ledger_core::application::wallet::WalletService;
use ledger_core::domain::money::Amount;
use ledger_core::domain::ports::LedgerStore;
use ledger_core::infrastructure::in_memory::InMemoryLedger;
use ledger_core::infrastructure::references::SystemReferences;
use ledger_core::interfaces::csv::balance_writer::BalanceWriter;
use ledger_core::interfaces::csv::operation_reader::{Operation, OperationReader, OperationType};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file (fund / transfer rows)
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().into_diagnostic()?))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store = Arc::new(InMemoryLedger::new());
    let wallets = WalletService::new(store.clone());
    let transfers = TransferEngine::new(store.clone(), Arc::new(SystemReferences::new()));

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for row in reader.operations() {
        match row {
            Ok(operation) => {
                if let Err(e) = apply(&wallets, &transfers, operation).await {
                    warn!("operation failed: {e}");
                }
            }
            Err(e) => warn!("skipping unreadable row: {e}"),
        }
    }

    let all = store.all_wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_wallets(all).into_diagnostic()?;

    Ok(())
}

async fn apply(
    wallets: &WalletService,
    transfers: &TransferEngine,
    operation: Operation,
) -> ledger_core::error::Result<()> {
    let amount = Amount::new(operation.amount)?;
    match operation.op {
        OperationType::Fund => {
            wallets.fund_wallet(operation.user, amount).await?;
        }
        OperationType::Transfer => {
            let key = operation.key.ok_or_else(|| {
                ledger_core::error::LedgerError::Validation(
                    "transfer row is missing an idempotency key".to_string(),
                )
            })?;
            let receiver = operation.counterparty.ok_or_else(|| {
                ledger_core::error::LedgerError::Validation(
                    "transfer row is missing a counterparty".to_string(),
                )
            })?;
            transfers
                .transfer(operation.user, &key, receiver, amount)
                .await?;
        }
    }
    Ok(())
}
