//! Wallet engine
//!
//! This module provides the `WalletEngine` that orchestrates balance operations
//! by coordinating between a `LedgerStore` (the source of truth) and a
//! `BalanceCache` (a best-effort read accelerator).
//!
//! The engine enforces business rules such as:
//! - Amounts must be positive with at most four fractional digits
//! - Withdrawals and transfers need sufficient funds at check time
//! - Transfer recipients must exist and differ from the source
//!
//! The engine keeps no mutable state between calls. Mutual exclusion per
//! account belongs to the store, which also re-checks non-negativity inside its
//! atomic unit, so the engine-side funds check is only an early rejection.
//!
//! # Reads
//!
//! - [`WalletEngine::read_fast`] is cache-first with read-through fill. Use it
//!   for display, never to gate a mutation.
//! - [`WalletEngine::read_authoritative`] reads the store only.
//!
//! # Write-through
//!
//! After every committed mutation the post-commit balances are pushed into the
//! cache. If that fails the mutation stays committed and the caller receives
//! [`WalletError::CacheAfterCommit`] carrying the committed balances.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::core::traits::{BalanceCache, LedgerStore};
use crate::types::{
    is_valid_amount, CacheError, Committed, StoreError, Transaction, UserId, Wallet, WalletError,
};

/// Default deadline for a single store or cache call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline applied to every individual store and cache call
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Create a config with the given per-call deadline
    ///
    /// A zero deadline falls back to [`DEFAULT_CALL_TIMEOUT`].
    pub fn new(call_timeout: Duration) -> Self {
        let call_timeout = if call_timeout.is_zero() {
            DEFAULT_CALL_TIMEOUT
        } else {
            call_timeout
        };
        EngineConfig { call_timeout }
    }
}

/// Errors that can report an elapsed deadline
trait Deadline {
    fn elapsed(operation: &'static str, millis: u64) -> Self;
}

impl Deadline for StoreError {
    fn elapsed(operation: &'static str, millis: u64) -> Self {
        StoreError::Timeout {
            operation: operation.to_string(),
            millis,
        }
    }
}

impl Deadline for CacheError {
    fn elapsed(operation: &'static str, millis: u64) -> Self {
        CacheError::Timeout {
            operation: operation.to_string(),
            millis,
        }
    }
}

/// Wallet engine
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct WalletEngine {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn BalanceCache>,
    config: EngineConfig,
}

impl WalletEngine {
    /// Create a new WalletEngine
    ///
    /// # Arguments
    ///
    /// * `store` - Authoritative ledger store
    /// * `cache` - Balance cache kept in sync by write-through
    /// * `config` - Per-call deadlines
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn BalanceCache>,
        config: EngineConfig,
    ) -> Self {
        WalletEngine {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Release the store's pooled resources
    pub async fn shutdown(&self) {
        self.store.close().await;
    }

    /// Provision a zero-balance wallet and seed its cache entry
    ///
    /// # Errors
    ///
    /// * `AccountExists` if the wallet is already open
    /// * `CacheAfterCommit` if the wallet was created but the cache seed failed
    pub async fn open_account(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        let result: Result<Wallet, WalletError> = async {
            let wallet = self
                .bounded("open_account", self.store.open_account(user_id))
                .await?;
            self.write_through(Committed::Balance {
                user_id,
                balance: wallet.balance,
            })
            .await?;
            Ok(wallet)
        }
        .await;

        self.report("open_account", &[user_id], None, &result);
        result
    }

    /// Credit `amount` to the wallet
    ///
    /// # Arguments
    ///
    /// * `user_id` - Wallet to credit
    /// * `amount` - Positive amount
    ///
    /// # Returns
    ///
    /// The committed balance after the deposit
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` before any store call
    /// * `AccountNotFound` if the wallet does not exist
    /// * `Store` if the atomic unit failed and was rolled back
    /// * `CacheAfterCommit` if the deposit committed but the cache update failed
    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<Decimal, WalletError> {
        let result: Result<Decimal, WalletError> = async {
            validate_amount(amount)?;
            let balance = self
                .bounded("apply_delta", self.store.apply_delta(user_id, amount))
                .await?;
            self.write_through(Committed::Balance { user_id, balance })
                .await?;
            Ok(balance)
        }
        .await;

        self.report("deposit", &[user_id], Some(amount), &result);
        result
    }

    /// Debit `amount` from the wallet
    ///
    /// The funds check reads the store, not the cache. The store repeats the
    /// check inside its atomic unit, so concurrent withdrawals cannot overdraw.
    ///
    /// # Returns
    ///
    /// The committed balance after the withdrawal
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` before any store call
    /// * `AccountNotFound` if the wallet does not exist
    /// * `InsufficientFunds` if the balance is below `amount`
    /// * `Store` if the atomic unit failed and was rolled back
    /// * `CacheAfterCommit` if the withdrawal committed but the cache update failed
    pub async fn withdraw(&self, user_id: UserId, amount: Decimal) -> Result<Decimal, WalletError> {
        let result: Result<Decimal, WalletError> = async {
            validate_amount(amount)?;

            let available = self.authoritative(user_id).await?;
            if available < amount {
                return Err(WalletError::insufficient_funds(user_id, available, amount));
            }

            let balance = self
                .bounded("apply_delta", self.store.apply_delta(user_id, -amount))
                .await?;
            self.write_through(Committed::Balance { user_id, balance })
                .await?;
            Ok(balance)
        }
        .await;

        self.report("withdraw", &[user_id], Some(amount), &result);
        result
    }

    /// Move `amount` from one wallet to another
    ///
    /// # Returns
    ///
    /// The committed balances `(from, to)`
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` before any store call
    /// * `SelfTransfer` if `from_id == to_id`
    /// * `AccountNotFound` if the source does not exist
    /// * `InsufficientFunds` if the source balance is below `amount`
    /// * `RecipientNotFound` if the destination does not exist
    /// * `Store` if the atomic unit failed and was rolled back
    /// * `CacheAfterCommit` if the transfer committed but a cache update failed
    pub async fn transfer(
        &self,
        from_id: UserId,
        to_id: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), WalletError> {
        let result: Result<(Decimal, Decimal), WalletError> = async {
            validate_amount(amount)?;
            if from_id == to_id {
                return Err(WalletError::SelfTransfer { user_id: from_id });
            }

            // Funds first, then the recipient
            let available = self.authoritative(from_id).await?;
            if available < amount {
                return Err(WalletError::insufficient_funds(from_id, available, amount));
            }
            self.authoritative(to_id)
                .await
                .map_err(|e| recipient_error(e, to_id))?;

            let (from_balance, to_balance) = self
                .bounded(
                    "apply_transfer",
                    self.store.apply_transfer(from_id, to_id, amount),
                )
                .await
                .map_err(|e| recipient_error(WalletError::from(e), to_id))?;

            self.write_through(Committed::Transfer {
                from_user_id: from_id,
                from_balance,
                to_user_id: to_id,
                to_balance,
            })
            .await?;
            Ok((from_balance, to_balance))
        }
        .await;

        self.report("transfer", &[from_id, to_id], Some(amount), &result);
        result
    }

    /// Cache-first balance read
    ///
    /// Alias of [`WalletEngine::read_fast`].
    pub async fn get_balance(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        self.read_fast(user_id).await
    }

    /// Cache-first balance read with read-through fill
    ///
    /// On a hit the store is not consulted. On a miss the store is read and the
    /// cache populated; a failure to populate fails the read.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` if the wallet does not exist
    /// * `Cache` if the cache lookup or fill failed
    /// * `Store` if the store read failed
    pub async fn read_fast(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        let result: Result<Decimal, WalletError> = async {
            let cached = self
                .bounded("cache_get", self.cache.get(user_id))
                .await
                .map_err(WalletError::Cache)?;
            if let Some(balance) = cached {
                return Ok(balance);
            }

            let balance = self.authoritative(user_id).await?;
            self.bounded("cache_set", self.cache.set(user_id, balance))
                .await
                .map_err(WalletError::Cache)?;
            Ok(balance)
        }
        .await;

        self.report("read_fast", &[user_id], None, &result);
        result
    }

    /// Balance read from the store only
    ///
    /// Never touches the cache.
    pub async fn read_authoritative(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        let result = self.authoritative(user_id).await;
        self.report("read_authoritative", &[user_id], None, &result);
        result
    }

    /// All ledger records involving the wallet, newest first
    ///
    /// History is always read from the store.
    pub async fn get_transaction_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, WalletError> {
        let result = self
            .bounded("get_history", self.store.get_history(user_id))
            .await
            .map_err(WalletError::from);

        self.report("get_transaction_history", &[user_id], None, &result);
        result
    }

    async fn authoritative(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        Ok(self
            .bounded("get_balance", self.store.get_balance(user_id))
            .await?)
    }

    /// Push committed balances into the cache
    ///
    /// Every affected account is attempted; the first failure is returned.
    async fn write_through(&self, committed: Committed) -> Result<(), WalletError> {
        let balances = match committed {
            Committed::Balance { user_id, balance } => vec![(user_id, balance)],
            Committed::Transfer {
                from_user_id,
                from_balance,
                to_user_id,
                to_balance,
            } => vec![(from_user_id, from_balance), (to_user_id, to_balance)],
        };

        let mut failure = None;
        for (user_id, balance) in balances {
            if let Err(e) = self
                .bounded("cache_set", self.cache.set(user_id, balance))
                .await
            {
                failure.get_or_insert(e);
            }
        }

        match failure {
            None => Ok(()),
            Some(source) => Err(WalletError::CacheAfterCommit { committed, source }),
        }
    }

    /// Run one store or cache call under the configured deadline
    ///
    /// An elapsed deadline drops `call`, which rolls back any open store unit.
    async fn bounded<T, E, F>(&self, operation: &'static str, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Deadline,
    {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(E::elapsed(
                operation,
                self.config.call_timeout.as_millis() as u64,
            )),
        }
    }

    fn report<T>(
        &self,
        operation: &'static str,
        user_ids: &[UserId],
        amount: Option<Decimal>,
        result: &Result<T, WalletError>,
    ) {
        match result {
            Ok(_) => debug!(operation, ?user_ids, amount = ?amount, "operation succeeded"),
            Err(e) if e.is_client_error() => {
                info!(operation, ?user_ids, amount = ?amount, kind = e.kind(), "operation rejected: {}", e)
            }
            Err(e) => {
                error!(operation, ?user_ids, amount = ?amount, kind = e.kind(), "operation failed: {}", e)
            }
        }
    }
}

fn validate_amount(amount: Decimal) -> Result<(), WalletError> {
    if is_valid_amount(amount) {
        Ok(())
    } else {
        Err(WalletError::invalid_amount(amount))
    }
}

fn recipient_error(error: WalletError, to_id: UserId) -> WalletError {
    match error {
        WalletError::AccountNotFound { user_id } if user_id == to_id => {
            WalletError::RecipientNotFound { user_id }
        }
        other => other,
    }
}
