//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each fixture test:
//! 1. Reads input.csv from a fixture directory
//! 2. Replays every row through a wallet engine over the in-memory backends
//! 3. Writes the outcome CSV
//! 4. Compares it with expected.csv
//!
//! Fixtures are located in tests/fixtures/ and cover:
//! - The deposit / withdraw / transfer happy path
//! - Business rejections (missing accounts, self transfer, bad amounts)
//! - Malformed rows
//! - Four-digit precision limits
//!
//! Fixture rows depend on each other across users, so they are replayed one row
//! per batch. The concurrent tests below use the default batching and assert
//! invariants instead of exact output.

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use wallet_ledger::core::{
        BatchConfig, BatchProcessor, EngineConfig, MemoryCache, MemoryLedger, WalletEngine,
    };
    use wallet_ledger::io::{write_outcomes_csv, OperationKind};

    fn engine() -> (Arc<WalletEngine>, Arc<MemoryLedger>, Arc<MemoryCache>) {
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(MemoryCache::new());
        let engine = Arc::new(WalletEngine::new(
            ledger.clone(),
            cache.clone(),
            EngineConfig::default(),
        ));
        (engine, ledger, cache)
    }

    /// Replay tests/fixtures/{fixture_name}/input.csv and compare with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if fixture files cannot be read or the output differs.
    async fn run_test_fixture(fixture_name: &str, max_concurrent: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );

        let (engine, _, _) = engine();
        let processor = BatchProcessor::new(engine, BatchConfig::new(1, max_concurrent));

        let outcomes = processor
            .replay_file(Path::new(&input_path))
            .await
            .unwrap_or_else(|e| panic!("Failed to replay operations: {}", e));

        let mut output = Vec::new();
        write_outcomes_csv(&outcomes, &mut output).expect("Failed to write outcomes");
        let actual_output = String::from_utf8(output)
            .expect("Output is not UTF-8")
            .replace("\r\n", "\n");

        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {}\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path")]
    #[case("rejections")]
    #[case("malformed_rows")]
    #[case("precision")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fixtures(#[case] fixture: &str, #[values(1, 4)] max_concurrent: usize) {
        run_test_fixture(fixture, max_concurrent).await;
    }

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replay_conserves_money() {
        const USERS: i64 = 16;
        let (engine, ledger, _) = engine();
        for user in 1..=USERS {
            engine.open_account(user).await.unwrap();
        }

        // Row -> (kind, amount); deposits and withdrawals change the total, transfers do not
        let mut csv = String::from("type,user,to,amount\n");
        let mut rows: HashMap<usize, (OperationKind, Decimal)> = HashMap::new();
        for i in 0..600usize {
            let user = (i as i64 % USERS) + 1;
            let other = ((i as i64 * 7) % USERS) + 1;
            let amount = Decimal::new((i as i64 % 9 + 1) * 125, 2);
            let kind = match i % 4 {
                0 | 1 => OperationKind::Deposit,
                2 => OperationKind::Withdraw,
                _ => OperationKind::Transfer,
            };
            match kind {
                OperationKind::Transfer => {
                    csv.push_str(&format!("transfer,{},{},{}\n", user, other, amount))
                }
                _ => csv.push_str(&format!("{},{},,{}\n", kind, user, amount)),
            }
            rows.insert(i + 1, (kind, amount));
        }
        let file = create_temp_csv(&csv);

        let processor = BatchProcessor::new(engine.clone(), BatchConfig::new(50, 8));
        let outcomes = processor.replay_file(file.path()).await.unwrap();

        assert_eq!(outcomes.len(), 600);
        let mut net = Decimal::ZERO;
        let mut applied = 0;
        for outcome in outcomes.iter().filter(|outcome| outcome.is_ok()) {
            applied += 1;
            match rows[&outcome.row] {
                (OperationKind::Deposit, amount) => net += amount,
                (OperationKind::Withdraw, amount) => net -= amount,
                _ => {}
            }
        }
        for outcome in outcomes.iter().filter(|outcome| !outcome.is_ok()) {
            assert!(
                matches!(
                    outcome.status.as_str(),
                    "insufficient_funds" | "self_transfer"
                ),
                "unexpected failure on row {}: {}",
                outcome.row,
                outcome.detail
            );
        }

        assert_eq!(ledger.total_balance(), net);
        assert_eq!(ledger.record_count(), applied);
        for wallet in ledger.wallets() {
            assert!(wallet.balance >= Decimal::ZERO);
            assert_eq!(
                engine.read_authoritative(wallet.user_id).await.unwrap(),
                wallet.balance
            );
        }
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let (engine, _, _) = engine();
        let processor = BatchProcessor::new(engine, BatchConfig::default());

        let result = processor
            .replay_file(Path::new("tests/fixtures/does_not_exist.csv"))
            .await;

        assert!(result.unwrap_err().contains("Failed to open file"));
    }
}
