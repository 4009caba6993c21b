//! Core traits for the ledger store and the balance cache
//!
//! The engine only talks to these traits, so the PostgreSQL/Redis backends and the
//! in-memory backends can be used interchangeably.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{CacheError, StoreError, Transaction, UserId, Wallet};

/// Durable, transactional record of balances and ledger entries
///
/// The sole source of truth. Every mutating call is one atomic unit: the balance
/// change and its ledger record are committed together or not at all, and any
/// error (including a dropped future) leaves no partial effect.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Provision a zero-balance wallet for `user_id`
    async fn open_account(&self, user_id: UserId) -> Result<Wallet, StoreError>;

    /// Add `delta` to the balance and append a deposit (positive) or withdraw
    /// (negative) record
    ///
    /// Fails with `InsufficientFunds` when the result would be negative.
    async fn apply_delta(&self, user_id: UserId, delta: Decimal) -> Result<Decimal, StoreError>;

    /// Debit `from_id`, credit `to_id` and append one transfer record
    ///
    /// Returns the post-commit balances `(from, to)`.
    async fn apply_transfer(
        &self,
        from_id: UserId,
        to_id: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), StoreError>;

    /// Point-in-time authoritative balance
    async fn get_balance(&self, user_id: UserId) -> Result<Decimal, StoreError>;

    /// All records where the user is source or destination, newest first
    async fn get_history(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError>;

    /// Release pooled resources
    async fn close(&self) {}
}

/// Best-effort balance snapshot cache
///
/// Never the ground truth for a decision that gates a mutation.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// Cached balance, `None` on a miss
    async fn get(&self, user_id: UserId) -> Result<Option<Decimal>, CacheError>;

    /// Store `balance` as the latest snapshot for `user_id`
    async fn set(&self, user_id: UserId, balance: Decimal) -> Result<(), CacheError>;
}

/// Cache key for a user's balance
pub fn balance_key(user_id: UserId) -> String {
    format!("wallet_balance:{}", user_id)
}
