//! Wallet types for the wallet ledger
//!
//! This module defines the Wallet structure and the amount rules shared by the
//! engine and the store backends.

use super::transaction::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of fractional digits a stored amount may carry
///
/// Matches the `NUMERIC(20,4)` balance column.
pub const AMOUNT_SCALE: u32 = 4;

/// Exclusive upper bound for amounts and balances: 10^16
///
/// `NUMERIC(20,4)` leaves 16 integer digits. Keeping every value below this
/// also keeps `Decimal` sums exact, since 20 significant digits never fill its
/// 96-bit mantissa.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(1_874_919_424, 2_328_306, 0, false, 0);

/// Wallet state
///
/// The balance is owned by the ledger store; any copy outside it (cache entries,
/// values returned to callers) is a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// The owning user
    pub user_id: UserId,

    /// Never negative
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

impl Wallet {
    /// Create a wallet with a zero balance
    pub fn new(user_id: UserId) -> Self {
        Wallet {
            user_id,
            balance: Decimal::ZERO,
        }
    }
}

/// Whether `amount` is usable for a deposit, withdrawal or transfer
///
/// Amounts must be strictly positive, below [`AMOUNT_LIMIT`], and carry no
/// more than [`AMOUNT_SCALE`] fractional digits once trailing zeros are dropped.
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO
        && amount < AMOUNT_LIMIT
        && amount.normalize().scale() <= AMOUNT_SCALE
}
