// CLI module
// Subcommands of the `wallet` binary

mod args;

pub use args::{CliArgs, Command};

use clap::Parser;

/// Parse the process arguments
///
/// On invalid input or `--help`, clap prints its message and exits the
/// process, so callers always get a complete `CliArgs`.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
