//! PostgreSQL ledger store
//!
//! Every mutation runs in one `sqlx` transaction. A `Transaction` that is dropped
//! before `commit` (error path, `?`, or a cancelled future) is rolled back by
//! sqlx, so no partial effect ever becomes visible.
//!
//! Non-negativity is part of the atomic unit: debits are conditional updates
//! (`balance + $1 >= 0`), and transfers lock both rows in ascending user id order
//! with `SELECT ... FOR UPDATE` before touching them. A balance that would leave
//! `NUMERIC(20,4)` fails with `ArithmeticOverflow`.
//!
//! Record timestamps come from `clock_timestamp()`, the moment of the insert at
//! the end of the unit, rather than the transaction start.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use tracing::{debug, info};

use crate::core::traits::LedgerStore;
use crate::types::{PendingEntry, StoreError, Transaction, TransactionKind, UserId, Wallet};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS wallets (
        user_id BIGINT PRIMARY KEY,
        balance NUMERIC(20, 4) NOT NULL DEFAULT 0 CHECK (balance >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        transaction_id BIGSERIAL PRIMARY KEY,
        from_user_id BIGINT REFERENCES wallets (user_id),
        to_user_id BIGINT REFERENCES wallets (user_id),
        amount NUMERIC(20, 4) NOT NULL CHECK (amount > 0),
        transaction_type TEXT NOT NULL
            CHECK (transaction_type IN ('deposit', 'withdraw', 'transfer')),
        timestamp TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS transactions_from_user_idx ON transactions (from_user_id)",
    "CREATE INDEX IF NOT EXISTS transactions_to_user_idx ON transactions (to_user_id)",
];

/// `LedgerStore` backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Connect a pool and verify it with a round-trip
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(max_connections, "connected to PostgreSQL");

        Ok(PgLedger { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        PgLedger { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `wallets` and `transactions` tables if they are missing
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("ledger schema ready");
        Ok(())
    }

    async fn append_record(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        entry: PendingEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (from_user_id, to_user_id, amount, transaction_type)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.from_user_id)
        .bind(entry.to_user_id)
        .bind(entry.amount)
        .bind(entry.kind.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn locked_balance(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> Result<Option<Decimal>, StoreError> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(|row| row.try_get::<Decimal, _>("balance"))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn ensure_exists(&self, user_id: UserId) -> Result<(), StoreError> {
        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM wallets WHERE user_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::AccountNotFound { user_id })
        }
    }
}

/// SQLSTATE `numeric_value_out_of_range`
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Map a failed balance update, turning a numeric overflow into `ArithmeticOverflow`
fn balance_update_error(user_id: UserId) -> impl Fn(sqlx::Error) -> StoreError {
    move |error| {
        let overflow = error
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == NUMERIC_OUT_OF_RANGE);
        if overflow {
            StoreError::ArithmeticOverflow { user_id }
        } else {
            StoreError::from(error)
        }
    }
}

fn decode_transaction(row: &PgRow) -> Result<Transaction, StoreError> {
    let kind: String = row.try_get("transaction_type")?;
    let kind = kind
        .parse::<TransactionKind>()
        .map_err(|message| StoreError::Database { message })?;

    Ok(Transaction {
        transaction_id: row.try_get("transaction_id")?,
        from_user_id: row.try_get("from_user_id")?,
        to_user_id: row.try_get("to_user_id")?,
        amount: row.try_get("amount")?,
        kind,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn open_account(&self, user_id: UserId) -> Result<Wallet, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO wallets (user_id, balance) VALUES ($1, 0)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(_) => Ok(Wallet::new(user_id)),
            None => Err(StoreError::AccountExists { user_id }),
        }
    }

    async fn apply_delta(&self, user_id: UserId, delta: Decimal) -> Result<Decimal, StoreError> {
        if delta.is_zero() {
            return Err(StoreError::constraint(format!(
                "zero delta for account {}",
                user_id
            )));
        }

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE wallets SET balance = balance + $1
            WHERE user_id = $2 AND balance + $1 >= 0
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(balance_update_error(user_id))?;

        let new_balance: Decimal = match updated {
            Some(row) => row.try_get("balance")?,
            None => {
                // Either the wallet is missing or the debit would overdraw it.
                return match Self::locked_balance(&mut tx, user_id).await? {
                    None => Err(StoreError::AccountNotFound { user_id }),
                    Some(balance) => Err(StoreError::insufficient_funds(
                        user_id,
                        balance,
                        delta.abs(),
                    )),
                };
            }
        };

        Self::append_record(&mut tx, PendingEntry::for_delta(user_id, delta)).await?;
        tx.commit().await?;

        debug!(user_id, %delta, %new_balance, "delta committed");
        Ok(new_balance)
    }

    async fn apply_transfer(
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

        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT user_id, balance FROM wallets WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE",
        )
        .bind(vec![from_id, to_id])
        .fetch_all(&mut *tx)
        .await?;

        let mut from_balance = None;
        let mut to_found = false;
        for row in &rows {
            let user_id: UserId = row.try_get("user_id")?;
            if user_id == from_id {
                from_balance = Some(row.try_get::<Decimal, _>("balance")?);
            } else if user_id == to_id {
                to_found = true;
            }
        }

        let from_balance = from_balance.ok_or(StoreError::AccountNotFound { user_id: from_id })?;
        if !to_found {
            return Err(StoreError::AccountNotFound { user_id: to_id });
        }
        if from_balance < amount {
            return Err(StoreError::insufficient_funds(from_id, from_balance, amount));
        }

        let new_from: Decimal = sqlx::query(
            "UPDATE wallets SET balance = balance - $1 WHERE user_id = $2 RETURNING balance",
        )
        .bind(amount)
        .bind(from_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("balance")?;

        let new_to: Decimal = sqlx::query(
            "UPDATE wallets SET balance = balance + $1 WHERE user_id = $2 RETURNING balance",
        )
        .bind(amount)
        .bind(to_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(balance_update_error(to_id))?
        .try_get("balance")?;

        Self::append_record(&mut tx, PendingEntry::for_transfer(from_id, to_id, amount)).await?;
        tx.commit().await?;

        debug!(from_id, to_id, %amount, "transfer committed");
        Ok((new_from, new_to))
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("balance")?),
            None => Err(StoreError::AccountNotFound { user_id }),
        }
    }

    async fn get_history(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        self.ensure_exists(user_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT transaction_id, from_user_id, to_user_id, amount, transaction_type, timestamp
            FROM transactions
            WHERE from_user_id = $1 OR to_user_id = $1
            ORDER BY timestamp DESC, transaction_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_transaction).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}
