//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify:
//! - Balance never goes negative, whatever the operation sequence
//! - Replaying the history reproduces every recorded balance
//! - Credit then debit of the same amount is a no-op on the balance
//! - Overdrafts are rejected without side effects
//! - Pages match a newest-first slice of the full history

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;
use wallet_ledger::{
    Amount, Error, LedgerConfig, MemoryStore, PageRequest, TransactionType, WalletLedger,
};

#[derive(Debug, Clone)]
enum Op {
    Credit(Decimal),
    Debit(Decimal),
    Reset,
}

/// Strategy for generating valid amounts (positive, two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_00i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Debits weighted so that some succeed and some overdraw
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => amount_strategy().prop_map(Op::Credit),
        4 => amount_strategy().prop_map(Op::Debit),
        1 => Just(Op::Reset),
    ]
}

fn memory_ledger() -> WalletLedger {
    WalletLedger::in_memory()
}

/// RocksDB-backed ledger; keep the TempDir alive for the ledger's lifetime
fn rocks_ledger() -> (WalletLedger, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = LedgerConfig::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (WalletLedger::open(config).unwrap(), temp_dir)
}

fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Apply `ops` to a fresh wallet, checking every step against a plain model
async fn check_against_model(
    ledger: &WalletLedger,
    ops: &[Op],
) -> Result<(), TestCaseError> {
    let wallet = ledger.create_wallet().await.unwrap();
    let id = wallet.wallet_id;

    let mut model_balance = Decimal::ZERO;
    let mut model_len = 0u64;

    for op in ops {
        match op {
            Op::Credit(value) => {
                let receipt = ledger.credit(id, amount(*value), None).await.unwrap();
                model_balance += *value;
                model_len += 1;
                prop_assert_eq!(receipt.new_balance, model_balance);
            }
            Op::Debit(value) => match ledger.debit(id, amount(*value), None).await {
                Ok(receipt) => {
                    prop_assert!(*value <= model_balance);
                    model_balance -= *value;
                    model_len += 1;
                    prop_assert_eq!(receipt.new_balance, model_balance);
                }
                Err(Error::InsufficientFunds {
                    current_balance,
                    requested_amount,
                }) => {
                    prop_assert!(*value > model_balance);
                    prop_assert_eq!(current_balance, model_balance);
                    prop_assert_eq!(requested_amount, *value);
                }
                Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {}", e))),
            },
            Op::Reset => {
                ledger.reset(id).await.unwrap();
                model_balance = Decimal::ZERO;
                model_len = 0;
            }
        }

        let balance = ledger.get_balance(id).await.unwrap().balance;
        prop_assert!(balance >= Decimal::ZERO);
        prop_assert_eq!(balance, model_balance);
    }

    let summary = ledger.get_summary(id).await.unwrap();
    prop_assert_eq!(summary.transaction_count, model_len);
    prop_assert_eq!(summary.balance, model_balance);
    prop_assert_eq!(
        summary.total_credits - summary.total_debits,
        model_balance
    );

    prop_assert!(ledger.verify_history(id).await.is_ok());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: any operation sequence keeps the balance non-negative and replayable
    #[test]
    fn prop_operation_sequence_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = memory_ledger();
            check_against_model(&ledger, &ops).await
        })?;
    }

    /// Property: credit then debit of the same amount restores the balance
    #[test]
    fn prop_credit_then_debit_restores_balance(
        initial in amount_strategy(),
        value in amount_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = memory_ledger();
            let id = ledger.create_wallet().await.unwrap().wallet_id;
            ledger.credit(id, amount(initial), None).await.unwrap();

            let before = ledger.get_balance(id).await.unwrap().balance;
            ledger.credit(id, amount(value), None).await.unwrap();
            ledger.debit(id, amount(value), None).await.unwrap();

            prop_assert_eq!(ledger.get_balance(id).await.unwrap().balance, before);

            let page = ledger.get_transactions(id, PageRequest::default()).await.unwrap();
            prop_assert_eq!(page.count, 3);
            prop_assert_eq!(page.transactions[0].transaction_type, TransactionType::Debit);
            prop_assert_eq!(page.transactions[1].transaction_type, TransactionType::Credit);
            Ok(())
        })?;
    }

    /// Property: an overdraft changes neither balance nor history
    #[test]
    fn prop_overdraft_rejected(balance in amount_strategy(), extra in amount_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = memory_ledger();
            let id = ledger.create_wallet().await.unwrap().wallet_id;
            ledger.credit(id, amount(balance), None).await.unwrap();

            let requested = balance + extra;
            let err = ledger.debit(id, amount(requested), None).await.unwrap_err();
            let is_insufficient = matches!(
                err,
                Error::InsufficientFunds { current_balance, requested_amount }
                    if current_balance == balance && requested_amount == requested
            );
            prop_assert!(is_insufficient);

            prop_assert_eq!(ledger.get_balance(id).await.unwrap().balance, balance);
            let page = ledger.get_transactions(id, PageRequest::default()).await.unwrap();
            prop_assert_eq!(page.count, 1);
            Ok(())
        })?;
    }

    /// Property: a page is the newest-first slice [offset, offset + limit)
    #[test]
    fn prop_pages_match_newest_first_slice(
        count in 0usize..25,
        limit in 1u64..10,
        offset in 0u64..30,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let ledger = WalletLedger::new(store, LedgerConfig::default());
            let id = ledger.create_wallet().await.unwrap().wallet_id;

            let mut ids = Vec::new();
            for i in 0..count {
                let receipt = ledger
                    .credit(id, amount(Decimal::from(i as u64 + 1)), None)
                    .await
                    .unwrap();
                ids.push(receipt.transaction_id);
            }

            let expected: Vec<_> = ids
                .iter()
                .rev()
                .skip(offset as usize)
                .take(limit as usize)
                .copied()
                .collect();

            let page = ledger
                .get_transactions(id, PageRequest::new(limit, offset))
                .await
                .unwrap();
            let actual: Vec<_> = page.transactions.iter().map(|tx| tx.transaction_id).collect();

            prop_assert_eq!(actual, expected);
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    /// Property: the RocksDB adapter behaves like the model too
    #[test]
    fn prop_rocksdb_sequence_matches_model(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = rocks_ledger();
            check_against_model(&ledger, &ops).await
        })?;
    }
}
