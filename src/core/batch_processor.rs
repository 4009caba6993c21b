//! Batch replay with user-based partitioning
//!
//! This module provides the `BatchProcessor`, which replays operation rows
//! through a shared `WalletEngine`.
//!
//! # Design
//!
//! Each batch is partitioned by initiating user. Partitions run as concurrent
//! tokio tasks (bounded by `BatchConfig::max_concurrent`) while the rows of one
//! partition keep their file order. Batches run one after another, so a user's
//! rows stay ordered across the whole file. Dropping a replay future aborts the
//! partition tasks it spawned.
//!
//! Rows of different users inside one batch are not ordered with respect to
//! each other. A transfer's credit to another user may land before or after
//! that user's own rows in the same batch.
//!
//! ```text
//! BatchProcessor
//!     ├── Arc<WalletEngine>   (shared engine)
//!     ├── Arc<Semaphore>      (partition concurrency limit)
//!     └── BatchConfig         (configuration parameters)
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::core::engine::WalletEngine;
use crate::io::csv_format::{MalformedRow, Operation, OperationKind, OperationOutcome};
use crate::io::sync_reader::SyncReader;
use crate::types::{UserId, WalletError};

/// Replay tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of rows read before a batch is dispatched
    pub batch_size: usize,

    /// Maximum number of user partitions processed at once
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size, default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(
                "Invalid max_concurrent ({}), using default ({})",
                max_concurrent, default.max_concurrent
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}

/// Batch processor with user-based partitioning
///
/// Cloneable; clones share the engine and the concurrency limit.
#[derive(Clone)]
pub struct BatchProcessor {
    engine: Arc<WalletEngine>,
    permits: Arc<Semaphore>,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(engine: Arc<WalletEngine>, config: BatchConfig) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
        }
    }

    /// Replay every row of a CSV file
    ///
    /// # Returns
    ///
    /// One outcome per data row, in no particular order. Malformed rows are
    /// included with a `malformed` status.
    ///
    /// # Errors
    ///
    /// Returns an error message only if the file cannot be opened.
    pub async fn replay_file(&self, path: &Path) -> Result<Vec<OperationOutcome>, String> {
        let reader = SyncReader::new(path)?;
        let outcomes = self.replay(reader).await;

        let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
        info!(
            path = %path.display(),
            rows = outcomes.len(),
            failed,
            "replay finished"
        );
        Ok(outcomes)
    }

    /// Replay rows from any source, batch by batch
    pub async fn replay<I>(&self, rows: I) -> Vec<OperationOutcome>
    where
        I: IntoIterator<Item = Result<Operation, MalformedRow>>,
    {
        let mut rows = rows.into_iter();
        let mut outcomes = Vec::new();

        loop {
            let batch: Vec<_> = rows.by_ref().take(self.config.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let mut operations = Vec::with_capacity(batch.len());
            for row in batch {
                match row {
                    Ok(op) => operations.push(op),
                    Err(malformed) => {
                        warn!(row = malformed.row, "skipping malformed row: {}", malformed.message);
                        outcomes.push(OperationOutcome::malformed(malformed));
                    }
                }
            }

            // Wait for the batch before reading on, so a user's rows stay in order
            outcomes.extend(self.process_batch(operations).await);
        }

        outcomes
    }

    /// Partition a batch by initiating user
    ///
    /// Row order within each partition is preserved.
    pub fn partition_by_user(&self, batch: Vec<Operation>) -> HashMap<UserId, Vec<Operation>> {
        let mut user_batches: HashMap<UserId, Vec<Operation>> = HashMap::new();

        for op in batch {
            user_batches.entry(op.user).or_default().push(op);
        }

        user_batches
    }

    /// Process one user's operations sequentially
    pub async fn process_user_operations(&self, operations: Vec<Operation>) -> Vec<OperationOutcome> {
        let mut outcomes = Vec::with_capacity(operations.len());

        for op in operations {
            outcomes.push(self.apply(&op).await);
        }

        outcomes
    }

    /// Process a batch, running user partitions concurrently
    ///
    /// Partition tasks live in a `JoinSet`; dropping this future (Ctrl-C in the
    /// CLI) aborts every task that has not finished.
    pub async fn process_batch(&self, batch: Vec<Operation>) -> Vec<OperationOutcome> {
        let user_batches = self.partition_by_user(batch);

        let mut tasks = JoinSet::new();
        for (_user_id, operations) in user_batches {
            let processor = self.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquire only fails after a bug
                let _permit = processor.permits.clone().acquire_owned().await.ok();
                processor.process_user_operations(operations).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(user_outcomes) => outcomes.extend(user_outcomes),
                Err(e) => error!("Replay task failed: {:?}", e),
            }
        }

        outcomes
    }

    /// Run one operation through the engine
    pub async fn apply(&self, op: &Operation) -> OperationOutcome {
        let result: Result<(Decimal, String), WalletError> = match op.kind {
            OperationKind::Open => self
                .engine
                .open_account(op.user)
                .await
                .map(|wallet| (wallet.balance, String::new())),
            OperationKind::Deposit => self
                .engine
                .deposit(op.user, op.amount.unwrap_or_default())
                .await
                .map(|balance| (balance, String::new())),
            OperationKind::Withdraw => self
                .engine
                .withdraw(op.user, op.amount.unwrap_or_default())
                .await
                .map(|balance| (balance, String::new())),
            OperationKind::Transfer => {
                let to = op.to.unwrap_or(op.user);
                self.engine
                    .transfer(op.user, to, op.amount.unwrap_or_default())
                    .await
                    .map(|(from_balance, to_balance)| {
                        (from_balance, format!("to={} balance={:.4}", to, to_balance))
                    })
            }
        };

        match result {
            Ok((balance, detail)) => OperationOutcome::succeeded(op, balance, detail),
            Err(e) => OperationOutcome::failed(op, &e),
        }
    }
}
