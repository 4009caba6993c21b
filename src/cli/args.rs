use crate::core::BatchConfig;
use crate::types::UserId;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Command-line arguments for the wallet service
#[derive(Parser, Debug)]
#[command(name = "wallet")]
#[command(about = "Wallet balances and transaction ledger", long_about = None)]
pub struct CliArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the binary
///
/// Every command prints its result as JSON on stdout, except `replay`, which
/// writes CSV.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the ledger tables if they are missing
    InitSchema,

    /// Open a zero-balance wallet
    Open {
        #[arg(value_name = "USER")]
        user: UserId,
    },

    /// Credit a wallet
    Deposit {
        #[arg(value_name = "USER")]
        user: UserId,
        #[arg(value_name = "AMOUNT", allow_hyphen_values = true)]
        amount: Decimal,
    },

    /// Debit a wallet
    Withdraw {
        #[arg(value_name = "USER")]
        user: UserId,
        #[arg(value_name = "AMOUNT", allow_hyphen_values = true)]
        amount: Decimal,
    },

    /// Move funds between two wallets
    Transfer {
        #[arg(value_name = "FROM")]
        from: UserId,
        #[arg(value_name = "TO")]
        to: UserId,
        #[arg(value_name = "AMOUNT", allow_hyphen_values = true)]
        amount: Decimal,
    },

    /// Show a wallet's balance
    Balance {
        #[arg(value_name = "USER")]
        user: UserId,

        /// Read from the ledger store, bypassing the cache
        #[arg(long)]
        authoritative: bool,
    },

    /// List a wallet's transactions, newest first
    History {
        #[arg(value_name = "USER")]
        user: UserId,
    },

    /// Replay operations from a CSV file (`type,user,to,amount`)
    Replay {
        #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
        input: PathBuf,

        /// Write results here instead of stdout
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,

        #[arg(
            long = "batch-size",
            value_name = "SIZE",
            help = "Number of rows per batch (default: 1000)"
        )]
        batch_size: Option<usize>,

        #[arg(
            long = "max-concurrent",
            value_name = "COUNT",
            help = "Maximum number of users processed concurrently (default: CPU cores)"
        )]
        max_concurrent: Option<usize>,
    },
}

impl Command {
    /// Create a BatchConfig from the replay arguments
    ///
    /// Returns `None` for commands other than `replay`. Missing values fall back
    /// to the defaults.
    pub fn to_batch_config(&self) -> Option<BatchConfig> {
        match self {
            Command::Replay {
                batch_size,
                max_concurrent,
                ..
            } => {
                let default = BatchConfig::default();
                Some(BatchConfig::new(
                    batch_size.unwrap_or(default.batch_size),
                    max_concurrent.unwrap_or(default.max_concurrent),
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::init_schema(&["wallet", "init-schema"], Command::InitSchema)]
    #[case::open(&["wallet", "open", "1"], Command::Open { user: 1 })]
    #[case::deposit(
        &["wallet", "deposit", "1", "100.50"],
        Command::Deposit { user: 1, amount: Decimal::new(10050, 2) }
    )]
    #[case::negative_amount(
        &["wallet", "withdraw", "1", "-5"],
        Command::Withdraw { user: 1, amount: Decimal::new(-5, 0) }
    )]
    #[case::transfer(
        &["wallet", "transfer", "1", "2", "70"],
        Command::Transfer { from: 1, to: 2, amount: Decimal::new(70, 0) }
    )]
    #[case::balance(
        &["wallet", "balance", "2", "--authoritative"],
        Command::Balance { user: 2, authoritative: true }
    )]
    #[case::history(&["wallet", "history", "3"], Command::History { user: 3 })]
    fn test_command_parsing(#[case] args: &[&str], #[case] expected: Command) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.command, expected);
        assert_eq!(parsed.config, None);
    }

    #[rstest]
    #[case::short(&["wallet", "-c", "wallet.toml", "open", "1"])]
    #[case::long_after_command(&["wallet", "open", "1", "--config", "wallet.toml"])]
    fn test_config_flag(#[case] args: &[&str]) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("wallet.toml")));
    }

    #[rstest]
    #[case::missing_command(&["wallet"])]
    #[case::bad_amount(&["wallet", "deposit", "1", "ten"])]
    #[case::bad_user(&["wallet", "open", "alice"])]
    #[case::missing_recipient(&["wallet", "transfer", "1", "5"])]
    fn test_invalid_arguments(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }

    #[rstest]
    #[case::all_defaults(&["wallet", "replay", "ops.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["wallet", "replay", "--batch-size", "2000", "ops.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["wallet", "replay", "--max-concurrent", "8", "ops.csv"], 1000, 8)]
    #[case::zero_values(
        &["wallet", "replay", "--batch-size", "0", "--max-concurrent", "0", "ops.csv"],
        1000,
        num_cpus::get()
    )]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.command.to_batch_config().unwrap();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent, expected_max_concurrent);
    }

    #[test]
    fn test_batch_config_only_for_replay() {
        let parsed = CliArgs::try_parse_from(["wallet", "open", "1"]).unwrap();
        assert_eq!(parsed.command.to_batch_config(), None);
    }
}
