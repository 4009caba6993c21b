//! CSV format handling for operation replay
//!
//! Input rows have the columns `type,user,to,amount`:
//!
//! ```text
//! type,user,to,amount
//! open,1,,
//! deposit,1,,100.00
//! transfer,1,2,70
//! ```
//!
//! Output rows have the columns `row,type,user,status,balance,detail`, one per
//! input row, sorted by row number.

use crate::types::{UserId, WalletError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Operation kinds accepted by the replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Open,
    Deposit,
    Withdraw,
    Transfer,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Open => "open",
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(OperationKind::Open),
            "deposit" => Ok(OperationKind::Deposit),
            "withdraw" => Ok(OperationKind::Withdraw),
            "transfer" => Ok(OperationKind::Transfer),
            _ => Err(format!("Invalid operation type: '{}'", s)),
        }
    }
}

/// Raw CSV row as deserialized from the input file
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub user: UserId,
    pub to: Option<UserId>,
    pub amount: Option<String>,
}

/// Validated replay operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// 1-based data row number (the header is not counted)
    pub row: usize,
    pub kind: OperationKind,
    /// Initiating user; rows are partitioned on this
    pub user: UserId,
    /// Transfer destination
    pub to: Option<UserId>,
    pub amount: Option<Decimal>,
}

/// Row that could not be turned into an [`Operation`]
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRow {
    pub row: usize,
    pub message: String,
}

/// Convert a raw CSV row into an [`Operation`]
///
/// Checks that the type is known, the amount parses, and that the columns the
/// type needs are present. Whether the amount is acceptable is left to the
/// engine.
///
/// # Arguments
///
/// * `row` - Data row number, used in error messages
/// * `csv_record` - The raw row
pub fn convert_csv_record(row: usize, csv_record: CsvRecord) -> Result<Operation, String> {
    let kind: OperationKind = csv_record.op_type.parse()?;

    let amount = match csv_record.amount {
        Some(amount_str) if !amount_str.trim().is_empty() => {
            match Decimal::from_str(amount_str.trim()) {
                Ok(decimal) => Some(decimal),
                Err(_) => {
                    return Err(format!("Invalid amount '{}' on row {}", amount_str, row));
                }
            }
        }
        _ => None,
    };

    match kind {
        OperationKind::Open => {}
        OperationKind::Deposit | OperationKind::Withdraw => {
            if amount.is_none() {
                return Err(format!("{} on row {} requires an amount", kind, row));
            }
        }
        OperationKind::Transfer => {
            if csv_record.to.is_none() {
                return Err(format!("transfer on row {} requires a recipient", row));
            }
            if amount.is_none() {
                return Err(format!("transfer on row {} requires an amount", row));
            }
        }
    }

    Ok(Operation {
        row,
        kind,
        user: csv_record.user,
        to: csv_record.to,
        amount,
    })
}

/// Outcome status of a replayed row
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Ok,
    /// The engine rejected or failed the operation; holds [`WalletError::kind`]
    Failed(&'static str),
    /// The row never reached the engine
    Malformed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Ok => "ok",
            OutcomeStatus::Failed(kind) => *kind,
            OutcomeStatus::Malformed => "malformed",
        }
    }
}

/// Result line for one input row
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub row: usize,
    pub kind: Option<OperationKind>,
    pub user: Option<UserId>,
    pub status: OutcomeStatus,
    /// Post-commit balance of the initiating user
    pub balance: Option<Decimal>,
    pub detail: String,
}

impl OperationOutcome {
    pub fn succeeded(op: &Operation, balance: Decimal, detail: String) -> Self {
        OperationOutcome {
            row: op.row,
            kind: Some(op.kind),
            user: Some(op.user),
            status: OutcomeStatus::Ok,
            balance: Some(balance),
            detail,
        }
    }

    pub fn failed(op: &Operation, error: &WalletError) -> Self {
        OperationOutcome {
            row: op.row,
            kind: Some(op.kind),
            user: Some(op.user),
            status: OutcomeStatus::Failed(error.kind()),
            balance: None,
            detail: error.to_string(),
        }
    }

    pub fn malformed(malformed: MalformedRow) -> Self {
        OperationOutcome {
            row: malformed.row,
            kind: None,
            user: None,
            status: OutcomeStatus::Malformed,
            balance: None,
            detail: malformed.message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }
}

/// Write outcomes to CSV format, sorted by row number
///
/// # Arguments
///
/// * `outcomes` - One outcome per replayed row
/// * `output` - Output writer (e.g., stdout or a file)
///
/// # Returns
///
/// * `Ok(())` if all outcomes were written
/// * `Err(String)` with an error message if writing failed
pub fn write_outcomes_csv(outcomes: &[OperationOutcome], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["row", "type", "user", "status", "balance", "detail"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = outcomes.to_vec();
    sorted.sort_by_key(|outcome| outcome.row);

    for outcome in sorted {
        writer
            .write_record(&[
                outcome.row.to_string(),
                outcome.kind.map(|kind| kind.to_string()).unwrap_or_default(),
                outcome.user.map(|user| user.to_string()).unwrap_or_default(),
                outcome.status.as_str().to_string(),
                outcome
                    .balance
                    .map(|balance| format!("{:.4}", balance))
                    .unwrap_or_default(),
                outcome.detail,
            ])
            .map_err(|e| format!("Failed to write outcome record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
