//! Wallet CLI
//!
//! Command-line front end for the wallet engine.
//!
//! # Usage
//!
//! ```bash
//! wallet init-schema
//! wallet open 1
//! wallet deposit 1 100
//! wallet transfer 1 2 70
//! wallet balance 2 --authoritative
//! wallet history 1
//! wallet -c wallet.toml replay operations.csv > results.csv
//! ```
//!
//! Results are printed to stdout as JSON (`replay` prints CSV). Logs go to
//! stderr. Ctrl-C cancels the running operation: replay partition tasks are
//! aborted, an uncommitted store transaction is rolled back, and the connection
//! pool is closed before exit.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: The operation was rejected or failed
//! - 2: Configuration or startup error
//! - 130: Interrupted

use std::fs::File;
use std::io::Write;
use std::process;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use wallet_ledger::cli::{self, Command};
use wallet_ledger::config::{CacheBackend, Settings, SettingsError, StoreBackend};
use wallet_ledger::core::{
    BalanceCache, BatchProcessor, LedgerStore, MemoryCache, MemoryLedger, PgLedger, RedisCache,
    WalletEngine,
};
use wallet_ledger::io::write_outcomes_csv;
use wallet_ledger::telemetry;
use wallet_ledger::types::{CacheError, StoreError, WalletError};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Failed to connect ledger store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to connect balance cache: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("{0}")]
    Io(String),

    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Wallet(_) | CliError::Io(_) => 1,
            CliError::Interrupted => 130,
            CliError::Settings(_) | CliError::Store(_) | CliError::Cache(_) => 2,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = telemetry::init(&settings.log) {
        eprintln!("Error: {}", e);
        process::exit(2);
    }

    if let Err(e) = run(args.command, &settings).await {
        if let CliError::Wallet(error) = &e {
            println!(
                "{}",
                json!({
                    "error": error.kind(),
                    "message": error.to_string(),
                    "mutation_applied": error.mutation_applied(),
                })
            );
        } else {
            eprintln!("Error: {}", e);
        }
        process::exit(e.exit_code());
    }
}

async fn run(command: Command, settings: &Settings) -> Result<(), CliError> {
    info!(app = %settings.app_name, "starting");

    if command == Command::InitSchema {
        return init_schema(settings).await;
    }

    let engine = Arc::new(build_engine(settings).await?);

    let result = tokio::select! {
        result = execute(&engine, command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling in-flight operation");
            Err(CliError::Interrupted)
        }
    };

    engine.shutdown().await;
    result
}

async fn init_schema(settings: &Settings) -> Result<(), CliError> {
    match settings.store.backend {
        StoreBackend::Postgres => {
            let ledger = PgLedger::connect(
                &settings.store.url,
                settings.store.max_connections,
                settings.acquire_timeout(),
            )
            .await?;
            let result = ledger.init_schema().await;
            ledger.close().await;
            result?;
            println!("{}", json!({ "schema": "ready" }));
        }
        StoreBackend::Memory => {
            println!("{}", json!({ "schema": "not_required" }));
        }
    }
    Ok(())
}

async fn build_engine(settings: &Settings) -> Result<WalletEngine, CliError> {
    let store: Arc<dyn LedgerStore> = match settings.store.backend {
        StoreBackend::Postgres => Arc::new(
            PgLedger::connect(
                &settings.store.url,
                settings.store.max_connections,
                settings.acquire_timeout(),
            )
            .await?,
        ),
        StoreBackend::Memory => Arc::new(MemoryLedger::new()),
    };

    let cache: Arc<dyn BalanceCache> = match settings.cache.backend {
        CacheBackend::Redis => {
            match RedisCache::connect(&settings.redis_url(), settings.cache_ttl()).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    store.close().await;
                    return Err(e.into());
                }
            }
        }
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
    };

    Ok(WalletEngine::new(store, cache, settings.engine_config()))
}

async fn execute(engine: &Arc<WalletEngine>, command: Command) -> Result<(), CliError> {
    let batch_config = command.to_batch_config();

    let output = match command {
        Command::InitSchema => json!({ "schema": "skipped" }),
        Command::Open { user } => {
            let wallet = engine.open_account(user).await?;
            json!({ "user_id": wallet.user_id, "balance": wallet.balance })
        }
        Command::Deposit { user, amount } => {
            let balance = engine.deposit(user, amount).await?;
            json!({ "user_id": user, "balance": balance })
        }
        Command::Withdraw { user, amount } => {
            let balance = engine.withdraw(user, amount).await?;
            json!({ "user_id": user, "balance": balance })
        }
        Command::Transfer { from, to, amount } => {
            let (from_balance, to_balance) = engine.transfer(from, to, amount).await?;
            json!({
                "from": { "user_id": from, "balance": from_balance },
                "to": { "user_id": to, "balance": to_balance },
            })
        }
        Command::Balance {
            user,
            authoritative,
        } => {
            let balance = if authoritative {
                engine.read_authoritative(user).await?
            } else {
                engine.read_fast(user).await?
            };
            json!({ "user_id": user, "balance": balance })
        }
        Command::History { user } => {
            let history = engine.get_transaction_history(user).await?;
            json!({ "user_id": user, "transactions": history })
        }
        Command::Replay { input, output, .. } => {
            let processor = BatchProcessor::new(Arc::clone(engine), batch_config.unwrap_or_default());
            let outcomes = processor.replay_file(&input).await.map_err(CliError::Io)?;

            let mut writer: Box<dyn Write> = match output {
                Some(path) => Box::new(File::create(&path).map_err(|e| {
                    CliError::Io(format!("Failed to create '{}': {}", path.display(), e))
                })?),
                None => Box::new(std::io::stdout()),
            };
            write_outcomes_csv(&outcomes, &mut writer).map_err(CliError::Io)?;
            return Ok(());
        }
    };

    println!("{}", output);
    Ok(())
}
