//! In-process transactional ledger store
//!
//! This module provides `MemoryLedger`, a `LedgerStore` that keeps wallets and the
//! transaction journal in memory with the same atomicity and isolation guarantees
//! as the PostgreSQL backend.
//!
//! # Design
//!
//! Wallet balances live in a `DashMap` of per-account mutexes. A mutation locks
//! every account it touches (ascending user id, so two transfers sharing an
//! endpoint never deadlock) and works through an [`AtomicUnit`]: balances are
//! written in place while the unit remembers their previous values, and the
//! ledger record is staged in the unit. Commit takes the journal lock only long
//! enough to assign the transaction id and push the record, so operations on
//! disjoint accounts run in parallel. Dropping the unit without committing
//! restores the balances and discards the staged record.
//!
//! Balance arithmetic is exact: a result at or beyond [`AMOUNT_LIMIT`], or one
//! that `Decimal` would have to round, fails with `ArithmeticOverflow`.
//!
//! # Instrumentation
//!
//! The store counts authoritative balance reads and can inject one-shot faults at
//! named stages of the atomic unit, or add latency before each call, so the
//! engine's cache and failure paths can be observed in tests.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::core::traits::LedgerStore;
use crate::types::{
    PendingEntry, StoreError, Transaction, TransactionId, UserId, Wallet, AMOUNT_LIMIT,
};

/// Point inside an atomic unit where an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    /// After the first balance write (the debit, for transfers and withdrawals)
    AfterDebit,
    /// After all balance writes, before the ledger record is staged
    BeforeRecord,
    /// After the record is staged, before the unit commits
    BeforeCommit,
}

impl FaultStage {
    fn name(&self) -> &'static str {
        match self {
            FaultStage::AfterDebit => "after_debit",
            FaultStage::BeforeRecord => "before_record",
            FaultStage::BeforeCommit => "before_commit",
        }
    }
}

type Slot = Arc<Mutex<Decimal>>;

/// In-memory `LedgerStore`
#[derive(Debug, Default)]
pub struct MemoryLedger {
    /// Balance per wallet, each behind its own lock
    accounts: DashMap<UserId, Slot>,

    /// Committed records in commit order
    journal: Mutex<Vec<Transaction>>,

    /// Last assigned transaction id
    last_id: AtomicI64,

    /// Number of `get_balance` calls served
    balance_reads: AtomicU64,

    /// One-shot fault armed by tests
    fault: Mutex<Option<FaultStage>>,

    /// Delay applied before every call
    latency: Mutex<Option<Duration>>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault that fails the next atomic unit reaching `stage`
    pub fn inject_fault(&self, stage: FaultStage) {
        *self.fault.lock() = Some(stage);
    }

    /// Delay every subsequent call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of authoritative balance reads served so far
    pub fn balance_reads(&self) -> u64 {
        self.balance_reads.load(Ordering::SeqCst)
    }

    /// Snapshot of all wallets, sorted by user id
    pub fn wallets(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self
            .accounts
            .iter()
            .map(|entry| Wallet {
                user_id: *entry.key(),
                balance: *entry.value().lock(),
            })
            .collect();
        wallets.sort_by_key(|wallet| wallet.user_id);
        wallets
    }

    /// Sum of every wallet balance
    pub fn total_balance(&self) -> Decimal {
        self.wallets().iter().map(|wallet| wallet.balance).sum()
    }

    /// Number of committed ledger records
    pub fn record_count(&self) -> usize {
        self.journal.lock().len()
    }

    fn slot(&self, user_id: UserId) -> Result<Slot, StoreError> {
        self.accounts
            .get(&user_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::AccountNotFound { user_id })
    }

    fn trip(&self, stage: FaultStage) -> Result<(), StoreError> {
        let mut armed = self.fault.lock();
        if *armed == Some(stage) {
            *armed = None;
            warn!(stage = stage.name(), "injected store fault");
            return Err(StoreError::Injected {
                stage: stage.name().to_string(),
            });
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn open_now(&self, user_id: UserId) -> Result<Wallet, StoreError> {
        let mut created = false;
        self.accounts.entry(user_id).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(Decimal::ZERO))
        });

        if created {
            debug!(user_id, "opened wallet");
            Ok(Wallet::new(user_id))
        } else {
            Err(StoreError::AccountExists { user_id })
        }
    }

    fn apply_delta_now(&self, user_id: UserId, delta: Decimal) -> Result<Decimal, StoreError> {
        if delta.is_zero() {
            return Err(StoreError::constraint(format!(
                "zero delta for account {}",
                user_id
            )));
        }

        let slot = self.slot(user_id)?;
        let mut unit = AtomicUnit::begin(&[(user_id, &slot)]);

        let balance = unit.balance(0);
        let new_balance = exact_sum(user_id, balance, delta)?;
        if new_balance < Decimal::ZERO {
            return Err(StoreError::insufficient_funds(user_id, balance, delta.abs()));
        }

        unit.write(0, new_balance);
        if delta.is_sign_negative() {
            self.trip(FaultStage::AfterDebit)?;
        }
        self.trip(FaultStage::BeforeRecord)?;

        unit.stage(PendingEntry::for_delta(user_id, delta));
        self.trip(FaultStage::BeforeCommit)?;

        let transaction_id = unit.commit(&self.journal, &self.last_id);
        debug!(user_id, %delta, ?transaction_id, "applied delta");
        Ok(new_balance)
    }

    fn apply_transfer_now(
        &self,
        from_id: UserId,
        to_id: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), StoreError> {
        if from_id == to_id {
            return Err(StoreError::constraint(format!(
                "transfer from account {} to itself",
                from_id
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(StoreError::constraint(format!(
                "non-positive transfer amount {}",
                amount
            )));
        }

        let from_slot = self.slot(from_id)?;
        let to_slot = self.slot(to_id)?;

        // Lock in ascending user id order; remember where each side landed.
        let (locks, from_idx, to_idx) = if from_id < to_id {
            ([(from_id, &from_slot), (to_id, &to_slot)], 0, 1)
        } else {
            ([(to_id, &to_slot), (from_id, &from_slot)], 1, 0)
        };
        let mut unit = AtomicUnit::begin(&locks);

        let from_balance = unit.balance(from_idx);
        if from_balance < amount {
            return Err(StoreError::insufficient_funds(from_id, from_balance, amount));
        }
        let new_from = exact_sum(from_id, from_balance, -amount)?;
        unit.write(from_idx, new_from);
        self.trip(FaultStage::AfterDebit)?;

        let new_to = exact_sum(to_id, unit.balance(to_idx), amount)?;
        unit.write(to_idx, new_to);
        self.trip(FaultStage::BeforeRecord)?;

        unit.stage(PendingEntry::for_transfer(from_id, to_id, amount));
        self.trip(FaultStage::BeforeCommit)?;

        let transaction_id = unit.commit(&self.journal, &self.last_id);
        debug!(from_id, to_id, %amount, ?transaction_id, "applied transfer");
        Ok((new_from, new_to))
    }

    fn balance_now(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        let slot = self.slot(user_id)?;
        let balance = *slot.lock();
        Ok(balance)
    }

    fn history_now(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        if !self.accounts.contains_key(&user_id) {
            return Err(StoreError::AccountNotFound { user_id });
        }

        // Journal order is commit order, so reversing gives newest first.
        let journal = self.journal.lock();
        Ok(journal
            .iter()
            .rev()
            .filter(|record| record.involves(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn open_account(&self, user_id: UserId) -> Result<Wallet, StoreError> {
        self.simulate_latency().await;
        self.open_now(user_id)
    }

    async fn apply_delta(&self, user_id: UserId, delta: Decimal) -> Result<Decimal, StoreError> {
        self.simulate_latency().await;
        self.apply_delta_now(user_id, delta)
    }

    async fn apply_transfer(
        &self,
        from_id: UserId,
        to_id: UserId,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), StoreError> {
        self.simulate_latency().await;
        self.apply_transfer_now(from_id, to_id, amount)
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        self.simulate_latency().await;
        self.balance_now(user_id)
    }

    async fn get_history(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        self.simulate_latency().await;
        self.history_now(user_id)
    }
}

/// `balance + delta`, refusing results the store cannot hold exactly
fn exact_sum(user_id: UserId, balance: Decimal, delta: Decimal) -> Result<Decimal, StoreError> {
    let sum = balance
        .checked_add(delta)
        .ok_or(StoreError::ArithmeticOverflow { user_id })?;
    // Decimal rounds fractional digits away instead of failing once the
    // mantissa is full; a shrunken scale means the sum is not exact.
    if sum.abs() >= AMOUNT_LIMIT || sum.scale() < balance.scale().max(delta.scale()) {
        return Err(StoreError::ArithmeticOverflow { user_id });
    }
    Ok(sum)
}

/// Locked accounts plus a staged record, with undo on drop
///
/// Mirrors a database transaction: nothing written through the unit survives
/// unless `commit` is called.
struct AtomicUnit<'a> {
    accounts: Vec<LockedAccount<'a>>,
    staged: Option<PendingEntry>,
    committed: bool,
}

struct LockedAccount<'a> {
    guard: MutexGuard<'a, Decimal>,
    before: Decimal,
}

impl<'a> AtomicUnit<'a> {
    /// Lock `slots` in the given order
    fn begin(slots: &[(UserId, &'a Slot)]) -> Self {
        let accounts = slots
            .iter()
            .map(|&(_, slot)| {
                let guard = slot.lock();
                let before = *guard;
                LockedAccount { guard, before }
            })
            .collect();

        AtomicUnit {
            accounts,
            staged: None,
            committed: false,
        }
    }

    fn balance(&self, idx: usize) -> Decimal {
        *self.accounts[idx].guard
    }

    fn write(&mut self, idx: usize, balance: Decimal) {
        *self.accounts[idx].guard = balance;
    }

    fn stage(&mut self, entry: PendingEntry) {
        self.staged = Some(entry);
    }

    /// Publish the staged record and keep the balance writes
    ///
    /// Ids are assigned under the journal lock, so journal order is id order.
    fn commit(
        mut self,
        journal: &Mutex<Vec<Transaction>>,
        last_id: &AtomicI64,
    ) -> Option<TransactionId> {
        let transaction_id = self.staged.take().map(|entry| {
            let mut journal = journal.lock();
            let transaction_id = last_id.fetch_add(1, Ordering::SeqCst) + 1;
            journal.push(Transaction {
                transaction_id,
                from_user_id: entry.from_user_id,
                to_user_id: entry.to_user_id,
                amount: entry.amount,
                kind: entry.kind,
                timestamp: Utc::now(),
            });
            transaction_id
        });
        self.committed = true;
        transaction_id
    }
}

impl Drop for AtomicUnit<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for account in &mut self.accounts {
            *account.guard = account.before;
        }
    }
}
