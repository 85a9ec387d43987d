use clap::Parser;
use marketplace_orders::application::engine::{Collaborators, OrderLifecycleEngine};
use marketplace_orders::application::replay::Replayer;
use marketplace_orders::config::EngineConfig;
use marketplace_orders::domain::ports::{AccountStoreBox, ListingStoreBox, OrderStoreBox};
use marketplace_orders::infrastructure::gateway::SimulatedPaymentGateway;
use marketplace_orders::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryListingStore, InMemoryOrderStore,
};
use marketplace_orders::infrastructure::notifications::LogDispatcher;
use marketplace_orders::interfaces::csv::command_reader::CommandReader;
use marketplace_orders::interfaces::csv::order_writer::OrderWriter;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ORDER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Smallest order total accepted for card payment
    #[arg(long, env = "ORDER_MINIMUM_TOTAL", default_value = "20000")]
    minimum_total: Decimal,

    /// Currency payment holds are placed in
    #[arg(long, env = "ORDER_CURRENCY", default_value = "vnd")]
    currency: String,

    /// Deadline for each payment gateway call, in milliseconds
    #[arg(long, env = "ORDER_GATEWAY_TIMEOUT_MS", default_value_t = 10_000)]
    gateway_timeout_ms: u64,

    /// Marketplace name used in email subjects
    #[arg(long, env = "ORDER_SITE_NAME", default_value = "Marketplace")]
    site_name: String,
}

impl Cli {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            minimum_total: self.minimum_total,
            currency: self.currency.clone(),
            gateway_timeout: Duration::from_millis(self.gateway_timeout_ms),
            site_name: self.site_name.clone(),
        }
    }
}

fn in_memory_stores() -> (OrderStoreBox, ListingStoreBox, AccountStoreBox) {
    let orders: OrderStoreBox = Box::new(InMemoryOrderStore::new());
    let listings: ListingStoreBox = Box::new(InMemoryListingStore::new());
    let accounts: AccountStoreBox = Box::new(InMemoryAccountStore::new());
    (orders, listings, accounts)
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&PathBuf>) -> Result<(OrderStoreBox, ListingStoreBox, AccountStoreBox)> {
    use marketplace_orders::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            let orders: OrderStoreBox = Box::new(store.clone());
            let listings: ListingStoreBox = Box::new(store.clone());
            let accounts: AccountStoreBox = Box::new(store);
            Ok((orders, listings, accounts))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&PathBuf>) -> Result<(OrderStoreBox, ListingStoreBox, AccountStoreBox)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let (orders, listings, accounts) = open_stores(cli.db_path.as_ref())?;
    let gateway = SimulatedPaymentGateway::new();
    let engine = OrderLifecycleEngine::new(
        Collaborators {
            orders,
            listings,
            accounts,
            gateway: Arc::new(gateway.clone()),
            notifier: Box::new(LogDispatcher),
        },
        cli.config(),
    );
    let replayer = Replayer::new(engine, gateway);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = replayer.apply(command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let orders = replayer.into_orders().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&orders).into_diagnostic()?;

    Ok(())
}
