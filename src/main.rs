use accrual_reconciler::accrual::backoff::Backoff;
use accrual_reconciler::accrual::client::AccrualClient;
use accrual_reconciler::application::reconciler::Reconciler;
use accrual_reconciler::application::scheduler::Scheduler;
use accrual_reconciler::config::Config;
use accrual_reconciler::domain::ports::{BalanceStoreHandle, OrderStoreHandle};
use accrual_reconciler::infrastructure::in_memory::InMemoryStore;
use accrual_reconciler::interfaces::csv::balance_writer::BalanceWriter;
use accrual_reconciler::interfaces::csv::order_reader::OrderReader;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let (orders, balances) = open_stores(&config)?;

    if let Some(path) = &config.orders {
        import_orders(path, &orders).await?;
    }

    let client = AccrualClient::new(
        &config.accrual_address,
        config.request_timeout(),
        config.default_retry_after(),
    )
    .into_diagnostic()?
    .with_max_retry_after(config.max_retry_after());
    let reconciler = Arc::new(Reconciler::new(orders.clone(), config.not_found_policy()));
    let scheduler = Scheduler::new(
        config.scheduler(),
        orders,
        Arc::new(client),
        Arc::new(Backoff::new()),
        reconciler,
    );

    if config.once {
        let report = scheduler.run_cycle().await;
        info!(?report, "single reconciliation cycle finished");
    } else {
        let handle = scheduler.spawn();
        shutdown_signal().await;
        info!("shutdown signal received");
        handle.shutdown(config.shutdown_grace()).await;
    }

    let balances = balances.all_balances().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_balances(balances).into_diagnostic()?;

    Ok(())
}

fn open_stores(config: &Config) -> Result<(OrderStoreHandle, BalanceStoreHandle)> {
    if let Some(db_path) = &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = Arc::new(
                accrual_reconciler::infrastructure::rocksdb::RocksDBStore::open(db_path)
                    .into_diagnostic()?,
            );
            info!(path = %db_path.display(), "using RocksDB storage");
            let orders: OrderStoreHandle = store.clone();
            let balances: BalanceStoreHandle = store;
            return Ok((orders, balances));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            warn!(
                path = %db_path.display(),
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let orders: OrderStoreHandle = store.clone();
    let balances: BalanceStoreHandle = store;
    Ok((orders, balances))
}

async fn import_orders(path: &Path, orders: &OrderStoreHandle) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let mut imported = 0usize;
    for order in OrderReader::new(file).orders() {
        match order {
            Ok(order) => {
                let number = order.number.clone();
                match orders.create(order).await {
                    Ok(()) => imported += 1,
                    Err(e) => warn!(order = %number, error = %e, "Error registering order"),
                }
            }
            Err(e) => warn!(error = %e, "Error reading order"),
        }
    }
    info!(imported, "orders registered");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
