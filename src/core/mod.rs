//! Core business logic module
//!
//! This module contains the wallet components:
//! - `traits` - `LedgerStore` and `BalanceCache` abstractions
//! - `engine` - Business rules, read tiers and write-through
//! - `ledger` - Ledger store backends (PostgreSQL, in-memory)
//! - `cache` - Balance cache backends (Redis, in-memory)
//! - `batch_processor` - Concurrent CSV replay through the engine

pub mod batch_processor;
pub mod cache;
pub mod engine;
pub mod ledger;
pub mod traits;

pub use batch_processor::{BatchConfig, BatchProcessor};
pub use cache::{MemoryCache, RedisCache};
pub use engine::{EngineConfig, WalletEngine};
pub use ledger::{FaultStage, MemoryLedger, PgLedger};
pub use traits::{balance_key, BalanceCache, LedgerStore};
