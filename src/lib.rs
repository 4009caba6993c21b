//! Wallet Ledger Library
//! # Overview
//!
//! This library keeps per-user wallet balances and an append-only transaction
//! ledger in a durable store, with a read-through/write-through balance cache in
//! front of it.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Wallet, Transaction, errors)
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Deposit, withdraw, transfer and the two read tiers
//!   - [`core::ledger`] - Ledger store backends, the source of truth
//!   - [`core::cache`] - Balance cache backends
//!   - [`core::batch_processor`] - Concurrent replay of CSV operation files
//! - [`io`] - Replay CSV format
//! - [`config`] - Layered service configuration
//! - [`telemetry`] - Logging setup
//! - [`cli`] - CLI arguments parsing
//!
//! # Operations
//!
//! - **Deposit**: Credit funds to a wallet
//! - **Withdraw**: Debit funds from a wallet (requires sufficient balance)
//! - **Transfer**: Move funds between two wallets atomically
//! - **Balance**: Cache-first (`read_fast`) or store-only (`read_authoritative`)
//! - **History**: Every ledger record touching a wallet, newest first
//!
//! # Guarantees
//!
//! - A balance change and its ledger record commit together or not at all
//! - Balances never go negative, including under concurrent debits
//! - The cache is never consulted for a decision that gates a mutation

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod telemetry;
pub mod types;

pub use core::{BatchConfig, BatchProcessor, EngineConfig, WalletEngine};
pub use io::write_outcomes_csv;
pub use types::{
    CacheError, Committed, StoreError, Transaction, TransactionId, TransactionKind, UserId,
    Wallet, WalletError,
};
