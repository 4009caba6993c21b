//! Logging setup
//!
//! One `tracing` subscriber is installed by the binary at startup. `RUST_LOG`
//! overrides the configured level. Logs go to stderr so that command results on
//! stdout stay machine-readable.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogSettings;

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error message if the level directive is invalid or a subscriber
/// is already installed.
pub fn init(settings: &LogSettings) -> Result<(), String> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter(&settings.level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| format!("Failed to initialise logging: {}", e))
}

/// Build a filter from a directive such as `info` or `wallet_ledger=debug,sqlx=warn`
pub fn filter(directive: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(directive)
        .map_err(|e| format!("Invalid log level '{}': {}", directive, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::level("info")]
    #[case::targets("wallet_ledger=debug,sqlx=warn")]
    fn test_filter_accepts_directives(#[case] directive: &str) {
        assert!(filter(directive).is_ok());
    }

    #[test]
    fn test_filter_rejects_bad_level() {
        assert!(filter("wallet_ledger=loud").is_err());
    }
}
