//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Wallet state and amount rules
//! - `transaction`: Identifiers, transaction kinds and ledger records
//! - `error`: Error types for the store, the cache and the engine

pub mod account;
pub mod error;
pub mod transaction;

pub use account::{is_valid_amount, Wallet, AMOUNT_LIMIT, AMOUNT_SCALE};
pub use error::{CacheError, Committed, StoreError, WalletError};
pub use transaction::{PendingEntry, Transaction, TransactionId, TransactionKind, UserId};
