//! Transaction-related types for the wallet ledger
//!
//! This module defines identifiers, the transaction kind enum and the immutable
//! ledger record written alongside every committed balance change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User identifier
///
/// Wallets are keyed by the owning user's identifier.
pub type UserId = i64;

/// Transaction identifier
///
/// Assigned by the ledger store at commit time, monotonically increasing.
pub type TransactionId = i64;

/// Kinds of balance mutation recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credit funds to a wallet
    ///
    /// Recorded with a destination and no source.
    Deposit,

    /// Debit funds from a wallet
    ///
    /// Recorded with a source and no destination.
    Withdraw,

    /// Move funds between two wallets
    ///
    /// Recorded with both source and destination.
    Transfer,
}

impl TransactionKind {
    /// Textual form persisted in the `transaction_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(format!("Unknown transaction kind '{}'", other)),
        }
    }
}

/// Immutable ledger record
///
/// Exists if and only if the corresponding balance mutation committed; both are
/// written in the same atomic unit by the ledger store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier
    pub transaction_id: TransactionId,

    /// Debited wallet (absent for deposits)
    pub from_user_id: Option<UserId>,

    /// Credited wallet (absent for withdrawals)
    pub to_user_id: Option<UserId>,

    /// Always positive
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    #[serde(rename = "transaction_type")]
    pub kind: TransactionKind,

    /// Commit time assigned by the store
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Whether `user_id` is the source or destination of this record
    pub fn involves(&self, user_id: UserId) -> bool {
        self.from_user_id == Some(user_id) || self.to_user_id == Some(user_id)
    }
}

/// Ledger entry prepared inside an atomic unit, before the store assigns
/// an identifier and timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingEntry {
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub amount: Decimal,
    pub kind: TransactionKind,
}

impl PendingEntry {
    /// Entry for a single-account delta; the sign decides deposit vs withdraw
    pub fn for_delta(user_id: UserId, delta: Decimal) -> Self {
        if delta.is_sign_negative() {
            PendingEntry {
                from_user_id: Some(user_id),
                to_user_id: None,
                amount: delta.abs(),
                kind: TransactionKind::Withdraw,
            }
        } else {
            PendingEntry {
                from_user_id: None,
                to_user_id: Some(user_id),
                amount: delta,
                kind: TransactionKind::Deposit,
            }
        }
    }

    pub fn for_transfer(from: UserId, to: UserId, amount: Decimal) -> Self {
        PendingEntry {
            from_user_id: Some(from),
            to_user_id: Some(to),
            amount,
            kind: TransactionKind::Transfer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case::deposit("deposit", TransactionKind::Deposit)]
    #[case::withdraw("withdraw", TransactionKind::Withdraw)]
    #[case::transfer("transfer", TransactionKind::Transfer)]
    #[case::mixed_case(" Transfer ", TransactionKind::Transfer)]
    fn test_kind_parsing(#[case] input: &str, #[case] expected: TransactionKind) {
        assert_eq!(input.parse::<TransactionKind>().unwrap(), expected);
        assert_eq!(expected.to_string(), expected.as_str());
    }

    #[test]
    fn test_kind_parsing_rejects_unknown() {
        assert!("chargeback".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_pending_entry_for_negative_delta_is_withdraw() {
        let entry = PendingEntry::for_delta(7, Decimal::new(-2500, 2));

        assert_eq!(entry.kind, TransactionKind::Withdraw);
        assert_eq!(entry.from_user_id, Some(7));
        assert_eq!(entry.to_user_id, None);
        assert_eq!(entry.amount, Decimal::new(2500, 2));
    }

    #[test]
    fn test_pending_entry_for_positive_delta_is_deposit() {
        let entry = PendingEntry::for_delta(7, Decimal::new(100, 0));

        assert_eq!(entry.kind, TransactionKind::Deposit);
        assert_eq!(entry.from_user_id, None);
        assert_eq!(entry.to_user_id, Some(7));
    }

    #[test]
    fn test_transaction_serializes_with_column_names() {
        let tx = Transaction {
            transaction_id: 3,
            from_user_id: Some(1),
            to_user_id: Some(2),
            amount: Decimal::new(7000, 2),
            kind: TransactionKind::Transfer,
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["transaction_type"], "transfer");
        assert_eq!(json["amount"], "70.00");
        assert!(tx.involves(1));
        assert!(tx.involves(2));
        assert!(!tx.involves(3));
    }
}
