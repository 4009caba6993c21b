//! Property and concurrency tests for the wallet engine
//!
//! Random operation sequences are checked against a simple balance model:
//! money is conserved, balances never go negative, and every committed
//! mutation has exactly one ledger record.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use wallet_ledger::core::{EngineConfig, MemoryCache, MemoryLedger, WalletEngine};
use wallet_ledger::types::{Transaction, TransactionKind, UserId, WalletError};

const USERS: UserId = 4;

#[derive(Debug, Clone)]
enum Op {
    Deposit(UserId, i64),
    Withdraw(UserId, i64),
    Transfer(UserId, UserId, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let user = 1..=USERS;
    let cents = 1i64..50_000;
    prop_oneof![
        (user.clone(), cents.clone()).prop_map(|(u, c)| Op::Deposit(u, c)),
        (user.clone(), cents.clone()).prop_map(|(u, c)| Op::Withdraw(u, c)),
        (user.clone(), user, cents).prop_map(|(f, t, c)| Op::Transfer(f, t, c)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// Newest ledger record visible to `user`
async fn newest_record(engine: &WalletEngine, user: UserId) -> Option<Transaction> {
    engine
        .get_transaction_history(user)
        .await
        .ok()
        .and_then(|history| history.into_iter().next())
}

fn engine() -> (Arc<WalletEngine>, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let engine = Arc::new(WalletEngine::new(
        ledger.clone(),
        Arc::new(MemoryCache::new()),
        EngineConfig::default(),
    ));
    (engine, ledger)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_engine_matches_balance_model(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let rt = runtime();
        rt.block_on(async {
            let (engine, ledger) = engine();
            let mut model: HashMap<UserId, Decimal> = HashMap::new();
            let mut records: HashMap<UserId, usize> = HashMap::new();
            for user in 1..=USERS {
                engine.open_account(user).await.unwrap();
                model.insert(user, Decimal::ZERO);
                records.insert(user, 0);
            }
            let mut net = Decimal::ZERO;
            let mut committed = 0usize;

            for op in &ops {
                match *op {
                    Op::Deposit(user, cents) => {
                        let amount = Decimal::new(cents, 2);
                        let balance = engine.deposit(user, amount).await.unwrap();
                        *model.get_mut(&user).unwrap() += amount;
                        prop_assert_eq!(balance, model[&user]);
                        let record = newest_record(&engine, user).await.unwrap();
                        prop_assert_eq!(record.kind, TransactionKind::Deposit);
                        prop_assert_eq!(record.amount, amount);
                        prop_assert_eq!((record.from_user_id, record.to_user_id), (None, Some(user)));
                        net += amount;
                        committed += 1;
                        *records.get_mut(&user).unwrap() += 1;
                    }
                    Op::Withdraw(user, cents) => {
                        let amount = Decimal::new(cents, 2);
                        match engine.withdraw(user, amount).await {
                            Ok(balance) => {
                                *model.get_mut(&user).unwrap() -= amount;
                                prop_assert_eq!(balance, model[&user]);
                                let record = newest_record(&engine, user).await.unwrap();
                                prop_assert_eq!(record.kind, TransactionKind::Withdraw);
                                prop_assert_eq!(record.amount, amount);
                                prop_assert_eq!(
                                    (record.from_user_id, record.to_user_id),
                                    (Some(user), None)
                                );
                                net -= amount;
                                committed += 1;
                                *records.get_mut(&user).unwrap() += 1;
                            }
                            Err(WalletError::InsufficientFunds { available, .. }) => {
                                prop_assert!(model[&user] < amount);
                                prop_assert_eq!(available, model[&user]);
                            }
                            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                        }
                    }
                    Op::Transfer(from, to, cents) => {
                        let amount = Decimal::new(cents, 2);
                        match engine.transfer(from, to, amount).await {
                            Ok((from_balance, to_balance)) => {
                                *model.get_mut(&from).unwrap() -= amount;
                                *model.get_mut(&to).unwrap() += amount;
                                prop_assert_eq!(from_balance, model[&from]);
                                prop_assert_eq!(to_balance, model[&to]);
                                let record = newest_record(&engine, from).await.unwrap();
                                prop_assert_eq!(record.kind, TransactionKind::Transfer);
                                prop_assert_eq!(record.amount, amount);
                                prop_assert_eq!(
                                    (record.from_user_id, record.to_user_id),
                                    (Some(from), Some(to))
                                );
                                prop_assert_eq!(newest_record(&engine, to).await, Some(record));
                                committed += 1;
                                *records.get_mut(&from).unwrap() += 1;
                                *records.get_mut(&to).unwrap() += 1;
                            }
                            Err(WalletError::SelfTransfer { .. }) => prop_assert_eq!(from, to),
                            Err(WalletError::InsufficientFunds { .. }) => {
                                prop_assert!(model[&from] < amount)
                            }
                            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                        }
                    }
                }
            }

            prop_assert_eq!(ledger.total_balance(), net);
            prop_assert_eq!(ledger.record_count(), committed);
            for user in 1..=USERS {
                let balance = engine.read_authoritative(user).await.unwrap();
                prop_assert!(balance >= Decimal::ZERO);
                prop_assert_eq!(balance, model[&user]);
                prop_assert_eq!(engine.read_fast(user).await.unwrap(), balance);

                let history = engine.get_transaction_history(user).await.unwrap();
                prop_assert_eq!(history.len(), records[&user]);
                prop_assert!(history.iter().all(|tx| tx.involves(user)));
                prop_assert!(history.windows(2).all(|w| w[0].transaction_id > w[1].transaction_id));
            }
            Ok(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_do_not_deadlock() {
    let (engine, ledger) = engine();
    engine.open_account(1).await.unwrap();
    engine.open_account(2).await.unwrap();
    engine.deposit(1, Decimal::new(500, 0)).await.unwrap();
    engine.deposit(2, Decimal::new(500, 0)).await.unwrap();

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                engine.transfer(from, to, Decimal::new(7, 0)).await
            })
        })
        .collect();

    let joined = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    })
    .await
    .expect("transfers deadlocked");

    for result in &joined {
        assert!(matches!(
            result,
            Ok(_) | Err(WalletError::InsufficientFunds { .. })
        ));
    }
    assert_eq!(ledger.total_balance(), Decimal::new(1000, 0));
    let transfers = joined.iter().filter(|result| result.is_ok()).count();
    assert_eq!(ledger.record_count(), transfers + 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_exceed_starting_balance() {
    let (engine, ledger) = engine();
    engine.open_account(9).await.unwrap();
    engine.deposit(9, Decimal::new(1000, 2)).await.unwrap();

    let tasks: Vec<_> = (0..40)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.withdraw(9, Decimal::new(75, 2)).await })
        })
        .collect();

    let mut withdrawn = Decimal::ZERO;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            withdrawn += Decimal::new(75, 2);
        }
    }

    let balance = engine.read_authoritative(9).await.unwrap();
    assert!(withdrawn <= Decimal::new(1000, 2));
    assert_eq!(balance, Decimal::new(1000, 2) - withdrawn);
    assert_eq!(balance, Decimal::new(25, 2));
    assert_eq!(ledger.record_count(), 1 + 13);
}
