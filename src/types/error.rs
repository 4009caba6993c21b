//! Error types for the wallet ledger
//!
//! Errors are split by the component that raises them:
//!
//! - **StoreError**: failures inside the ledger store's atomic unit. Any of these
//!   guarantees the unit was rolled back.
//! - **CacheError**: balance cache transport or data failures.
//! - **WalletError**: what engine callers see. Business rejections
//!   (`InvalidAmount`, `InsufficientFunds`, `RecipientNotFound`, `AccountNotFound`,
//!   `AccountExists`, `SelfTransfer`) are client-facing; `Store`, `Cache` and `CacheAfterCommit`
//!   are operational failures.
//!
//! Backend errors (sqlx, redis) are flattened into messages so every error type
//! stays `Clone` and comparable in tests.

use super::transaction::UserId;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Error raised by a ledger store backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No wallet exists for the user
    #[error("Account {user_id} not found")]
    AccountNotFound {
        /// The missing user
        user_id: UserId,
    },

    /// A wallet already exists for the user
    #[error("Account {user_id} already exists")]
    AccountExists {
        /// The user whose wallet exists
        user_id: UserId,
    },

    /// A debit would drive the balance below zero
    ///
    /// Checked inside the atomic unit, so this holds under concurrent access.
    #[error("Insufficient funds in account {user_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Decimal,
        requested: Decimal,
    },

    /// The requested mutation is not expressible (zero delta, self transfer)
    #[error("Constraint violation: {message}")]
    Constraint { message: String },

    /// Balance arithmetic left the representable range
    #[error("Arithmetic overflow on account {user_id}")]
    ArithmeticOverflow { user_id: UserId },

    /// Connectivity, query or commit failure reported by the database
    #[error("Database error: {message}")]
    Database { message: String },

    /// The call did not finish before its deadline
    #[error("Store operation {operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// Fault injected into the in-memory backend
    #[error("Injected store fault at {stage}")]
    Injected { stage: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Database {
            message: error.to_string(),
        }
    }
}

impl StoreError {
    /// Create an InsufficientFunds error
    pub fn insufficient_funds(user_id: UserId, balance: Decimal, requested: Decimal) -> Self {
        StoreError::InsufficientFunds {
            user_id,
            balance,
            requested,
        }
    }

    /// Create a Constraint error
    pub fn constraint(message: impl Into<String>) -> Self {
        StoreError::Constraint {
            message: message.into(),
        }
    }
}

/// Error raised by a balance cache backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Transport or protocol failure reported by the cache server
    #[error("Cache backend error: {message}")]
    Backend { message: String },

    /// The call did not finish before its deadline
    #[error("Cache operation {operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// Fault injected into the in-memory backend
    #[error("Injected cache fault on {operation}")]
    Injected { operation: String },
}

impl From<redis::RedisError> for CacheError {
    fn from(error: redis::RedisError) -> Self {
        CacheError::Backend {
            message: error.to_string(),
        }
    }
}

/// Balances that were durably committed before a write-through failure
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    /// Single-account deposit or withdrawal
    Balance { user_id: UserId, balance: Decimal },

    /// Both sides of a transfer
    Transfer {
        from_user_id: UserId,
        from_balance: Decimal,
        to_user_id: UserId,
        to_balance: Decimal,
    },
}

impl fmt::Display for Committed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Committed::Balance { user_id, balance } => {
                write!(f, "account {} balance {}", user_id, balance)
            }
            Committed::Transfer {
                from_user_id,
                from_balance,
                to_user_id,
                to_balance,
            } => write!(
                f,
                "account {} balance {}, account {} balance {}",
                from_user_id, from_balance, to_user_id, to_balance
            ),
        }
    }
}

/// Error returned by the wallet engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    /// Amount is zero, negative or too precise; rejected before any store call
    #[error("Invalid amount {amount}")]
    InvalidAmount { amount: Decimal },

    /// Source balance below the requested amount
    #[error("Insufficient funds for account {user_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        user_id: UserId,
        available: Decimal,
        requested: Decimal,
    },

    /// Transfer destination does not exist
    #[error("Recipient {user_id} not found")]
    RecipientNotFound { user_id: UserId },

    /// Queried or debited account does not exist
    #[error("Account {user_id} not found")]
    AccountNotFound { user_id: UserId },

    /// Opening a wallet that already exists
    #[error("Account {user_id} already exists")]
    AccountExists { user_id: UserId },

    /// Transfer source and destination are the same account
    #[error("Cannot transfer from account {user_id} to itself")]
    SelfTransfer { user_id: UserId },

    /// Durable store failure; the atomic unit was rolled back
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Cache failure on the read path; the read failed
    #[error("Cache error: {0}")]
    Cache(#[source] CacheError),

    /// The mutation committed but the cache could not be updated
    ///
    /// The ledger change is NOT rolled back. Treat the cache as unreliable for
    /// the accounts in `committed` and re-read from the store.
    #[error("Mutation applied ({committed}) but cache update failed: {source}")]
    CacheAfterCommit {
        committed: Committed,
        #[source]
        source: CacheError,
    },
}

impl From<StoreError> for WalletError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AccountNotFound { user_id } => WalletError::AccountNotFound { user_id },
            StoreError::AccountExists { user_id } => WalletError::AccountExists { user_id },
            StoreError::InsufficientFunds {
                user_id,
                balance,
                requested,
            } => WalletError::InsufficientFunds {
                user_id,
                available: balance,
                requested,
            },
            other => WalletError::Store(other),
        }
    }
}

impl WalletError {
    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        WalletError::InvalidAmount { amount }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(user_id: UserId, available: Decimal, requested: Decimal) -> Self {
        WalletError::InsufficientFunds {
            user_id,
            available,
            requested,
        }
    }

    /// Business-rule rejection that the caller caused
    ///
    /// These are reported back to the client and are not failures of the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WalletError::InvalidAmount { .. }
                | WalletError::InsufficientFunds { .. }
                | WalletError::RecipientNotFound { .. }
                | WalletError::AccountNotFound { .. }
                | WalletError::AccountExists { .. }
                | WalletError::SelfTransfer { .. }
        )
    }

    /// Whether a balance change was durably applied despite this error
    pub fn mutation_applied(&self) -> bool {
        matches!(self, WalletError::CacheAfterCommit { .. })
    }

    /// Short machine-readable label, used in replay output and JSON errors
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::InvalidAmount { .. } => "invalid_amount",
            WalletError::InsufficientFunds { .. } => "insufficient_funds",
            WalletError::RecipientNotFound { .. } => "recipient_not_found",
            WalletError::AccountNotFound { .. } => "account_not_found",
            WalletError::AccountExists { .. } => "account_exists",
            WalletError::SelfTransfer { .. } => "self_transfer",
            WalletError::Store(_) => "store_error",
            WalletError::Cache(_) => "cache_error",
            WalletError::CacheAfterCommit { .. } => "cache_error_after_commit",
        }
    }
}
