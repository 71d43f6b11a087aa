//! Ledger core: the wallet state machine
//!
//! Every mutation is one atomic unit against the store:
//!
//! ```text
//! begin()
//!   get_for_update(wallet:{id})      -- row lock, current balance
//!   check preconditions              -- NotFound / InsufficientFunds abort here
//! commit([
//!   Put    wallet:{id}               -- new balance + last_updated
//!   Append wallet:{id}:tx            -- history entry
//! ])
//! ```
//!
//! A reader therefore never sees a balance without its history entry, or the
//! reverse. Failed preconditions drop the transaction, which rolls it back.
//! Nothing here retries: a debit retried without re-reading the balance would
//! reintroduce the race the row lock exists to prevent.

use crate::{
    storage::{keys, BatchOp, KeyValueStore, StoreTransaction},
    types::{
        now_millis, Amount, CreditReceipt, DebitReceipt, DeleteReceipt, ResetReceipt,
        Transaction, TransactionType, Wallet,
    },
    Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Wallet state machine over an injected store
pub struct LedgerCore {
    store: Arc<dyn KeyValueStore>,
    max_reason_len: usize,
}

impl LedgerCore {
    /// Create a core over `store`, bounding reasons to `max_reason_len` characters
    pub fn new(store: Arc<dyn KeyValueStore>, max_reason_len: usize) -> Self {
        Self {
            store,
            max_reason_len,
        }
    }

    /// Assign a new wallet with a zero balance
    pub fn create_wallet(&self) -> Result<Wallet> {
        let wallet = Wallet::new(now_millis());

        let txn = self.store.begin()?;
        txn.commit(vec![BatchOp::Put {
            key: keys::wallet(&wallet.wallet_id),
            value: wallet.to_bytes()?,
        }])?;

        tracing::info!(wallet_id = %wallet.wallet_id, "Wallet created");
        Ok(wallet)
    }

    /// Current wallet record
    pub fn get_balance(&self, wallet_id: Uuid) -> Result<Wallet> {
        let bytes = self
            .store
            .get(&keys::wallet(&wallet_id))?
            .ok_or(Error::NotFound(wallet_id))?;
        Wallet::from_bytes(&bytes)
    }

    /// Add `amount` to the balance and append a credit entry
    pub fn credit(
        &self,
        wallet_id: Uuid,
        amount: Amount,
        reason: Option<&str>,
    ) -> Result<CreditReceipt> {
        let reason = self.check_reason(reason)?;
        let tx = self.apply(wallet_id, TransactionType::Credit, amount, reason)?;

        tracing::info!(
            wallet_id = %wallet_id,
            transaction_id = %tx.transaction_id,
            amount = %tx.amount,
            new_balance = %tx.balance_after_transaction,
            "Wallet credited"
        );

        Ok(CreditReceipt {
            wallet_id,
            credited_amount: tx.amount,
            new_balance: tx.balance_after_transaction,
            transaction_id: tx.transaction_id,
            timestamp: tx.timestamp,
        })
    }

    /// Subtract `amount` from the balance and append a debit entry
    ///
    /// Fails with `InsufficientFunds` (and writes nothing) when the balance read
    /// under the row lock is below `amount`.
    pub fn debit(
        &self,
        wallet_id: Uuid,
        amount: Amount,
        reason: Option<&str>,
    ) -> Result<DebitReceipt> {
        let reason = self.check_reason(reason)?;
        let tx = self.apply(wallet_id, TransactionType::Debit, amount, reason)?;

        tracing::info!(
            wallet_id = %wallet_id,
            transaction_id = %tx.transaction_id,
            amount = %tx.amount,
            new_balance = %tx.balance_after_transaction,
            "Wallet debited"
        );

        Ok(DebitReceipt {
            wallet_id,
            debited_amount: tx.amount,
            new_balance: tx.balance_after_transaction,
            transaction_id: tx.transaction_id,
            timestamp: tx.timestamp,
        })
    }

    /// Zero the balance and clear the history in one batch
    pub fn reset(&self, wallet_id: Uuid) -> Result<ResetReceipt> {
        let mut txn = self.store.begin()?;
        let mut wallet = Self::lock_wallet(txn.as_mut(), wallet_id)?;

        let now = now_millis();
        wallet.balance = Decimal::ZERO;
        wallet.last_updated = now;

        txn.commit(vec![
            BatchOp::Put {
                key: keys::wallet(&wallet_id),
                value: wallet.to_bytes()?,
            },
            BatchOp::Delete {
                key: keys::history(&wallet_id),
            },
        ])?;

        tracing::info!(wallet_id = %wallet_id, "Wallet reset");
        Ok(ResetReceipt {
            wallet_id,
            balance: Decimal::ZERO,
            reset_at: now,
        })
    }

    /// Remove the wallet and its history in one batch
    pub fn delete(&self, wallet_id: Uuid) -> Result<DeleteReceipt> {
        let mut txn = self.store.begin()?;
        Self::lock_wallet(txn.as_mut(), wallet_id)?;

        txn.commit(vec![
            BatchOp::Delete {
                key: keys::wallet(&wallet_id),
            },
            BatchOp::Delete {
                key: keys::history(&wallet_id),
            },
        ])?;

        tracing::info!(wallet_id = %wallet_id, "Wallet deleted");
        Ok(DeleteReceipt {
            wallet_id,
            deleted_at: now_millis(),
        })
    }

    /// Read-modify-write shared by credit and debit
    fn apply(
        &self,
        wallet_id: Uuid,
        transaction_type: TransactionType,
        amount: Amount,
        reason: String,
    ) -> Result<Transaction> {
        let mut txn = self.store.begin()?;
        let mut wallet = Self::lock_wallet(txn.as_mut(), wallet_id)?;

        let new_balance = match transaction_type {
            TransactionType::Credit => wallet
                .balance
                .checked_add(amount.value())
                .ok_or_else(|| {
                    Error::InvalidAmount(format!("Crediting {} would overflow the balance", amount))
                })?,
            TransactionType::Debit => {
                if wallet.balance < amount.value() {
                    tracing::warn!(
                        wallet_id = %wallet_id,
                        current_balance = %wallet.balance,
                        requested_amount = %amount,
                        "Debit rejected: insufficient funds"
                    );
                    return Err(Error::InsufficientFunds {
                        current_balance: wallet.balance,
                        requested_amount: amount.value(),
                    });
                }
                wallet.balance - amount.value()
            }
        }
        .normalize();

        let now = now_millis();
        wallet.balance = new_balance;
        wallet.last_updated = now;

        let tx = Transaction {
            transaction_id: Uuid::new_v4(),
            wallet_id,
            transaction_type,
            amount: amount.value(),
            reason,
            timestamp: now,
            balance_after_transaction: new_balance,
        };

        txn.commit(vec![
            BatchOp::Put {
                key: keys::wallet(&wallet_id),
                value: wallet.to_bytes()?,
            },
            BatchOp::Append {
                key: keys::history(&wallet_id),
                entry: tx.to_bytes()?,
            },
        ])?;

        Ok(tx)
    }

    fn lock_wallet(txn: &mut dyn StoreTransaction, wallet_id: Uuid) -> Result<Wallet> {
        let bytes = txn
            .get_for_update(&keys::wallet(&wallet_id))?
            .ok_or(Error::NotFound(wallet_id))?;
        Wallet::from_bytes(&bytes)
    }

    fn check_reason(&self, reason: Option<&str>) -> Result<String> {
        let reason = reason.unwrap_or_default();
        let len = reason.chars().count();
        if len > self.max_reason_len {
            return Err(Error::InvalidReason {
                len,
                max: self.max_reason_len,
            });
        }
        Ok(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn setup() -> (LedgerCore, Arc<dyn KeyValueStore>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        (LedgerCore::new(store.clone(), 500), store)
    }

    fn amount(value: i64) -> Amount {
        Amount::new(Decimal::from(value)).unwrap()
    }

    #[test]
    fn test_create_wallet() {
        let (core, _) = setup();
        let wallet = core.create_wallet().unwrap();

        assert_eq!(wallet.balance, Decimal::ZERO);
        assert_eq!(wallet.created_at, wallet.last_updated);
        assert_eq!(core.get_balance(wallet.wallet_id).unwrap(), wallet);
    }

    #[test]
    fn test_get_balance_unknown_wallet() {
        let (core, _) = setup();
        let id = Uuid::new_v4();
        assert!(matches!(core.get_balance(id), Err(Error::NotFound(w)) if w == id));
    }

    #[test]
    fn test_credit_updates_balance_and_history() {
        let (core, store) = setup();
        let wallet = core.create_wallet().unwrap();

        let receipt = core.credit(wallet.wallet_id, amount(100), Some("salary")).unwrap();
        assert_eq!(receipt.credited_amount, Decimal::from(100));
        assert_eq!(receipt.new_balance, Decimal::from(100));

        let stored = core.get_balance(wallet.wallet_id).unwrap();
        assert_eq!(stored.balance, Decimal::from(100));
        assert_eq!(stored.last_updated, receipt.timestamp);

        let history = store.read_sequence(&keys::history(&wallet.wallet_id)).unwrap();
        assert_eq!(history.len(), 1);
        let tx = Transaction::from_bytes(&history[0]).unwrap();
        assert_eq!(tx.transaction_id, receipt.transaction_id);
        assert_eq!(tx.transaction_type, TransactionType::Credit);
        assert_eq!(tx.reason, "salary");
    }

    #[test]
    fn test_credit_then_debit_same_amount() {
        let (core, store) = setup();
        let wallet = core.create_wallet().unwrap();
        core.credit(wallet.wallet_id, amount(40), None).unwrap();

        core.credit(wallet.wallet_id, amount(25), None).unwrap();
        let receipt = core.debit(wallet.wallet_id, amount(25), None).unwrap();

        assert_eq!(receipt.new_balance, Decimal::from(40));
        assert_eq!(
            store.sequence_len(&keys::history(&wallet.wallet_id)).unwrap(),
            3
        );
    }

    #[test]
    fn test_debit_insufficient_funds_changes_nothing() {
        let (core, store) = setup();
        let wallet = core.create_wallet().unwrap();
        core.credit(wallet.wallet_id, amount(10), None).unwrap();
        let before = core.get_balance(wallet.wallet_id).unwrap();

        let err = core.debit(wallet.wallet_id, amount(11), None).unwrap_err();
        match err {
            Error::InsufficientFunds {
                current_balance,
                requested_amount,
            } => {
                assert_eq!(current_balance, Decimal::from(10));
                assert_eq!(requested_amount, Decimal::from(11));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(core.get_balance(wallet.wallet_id).unwrap(), before);
        assert_eq!(
            store.sequence_len(&keys::history(&wallet.wallet_id)).unwrap(),
            1
        );
    }

    #[test]
    fn test_debit_entire_balance() {
        let (core, _) = setup();
        let wallet = core.create_wallet().unwrap();
        core.credit(wallet.wallet_id, amount(10), None).unwrap();

        let receipt = core.debit(wallet.wallet_id, amount(10), None).unwrap();
        assert_eq!(receipt.new_balance, Decimal::ZERO);
    }

    #[test]
    fn test_mutations_on_unknown_wallet() {
        let (core, store) = setup();
        let id = Uuid::new_v4();

        assert!(matches!(core.credit(id, amount(1), None), Err(Error::NotFound(_))));
        assert!(matches!(core.debit(id, amount(1), None), Err(Error::NotFound(_))));
        assert!(matches!(core.reset(id), Err(Error::NotFound(_))));
        assert!(matches!(core.delete(id), Err(Error::NotFound(_))));

        // no record was created as a side effect
        assert!(!store.exists(&keys::wallet(&id)).unwrap());
        assert!(!store.sequence_exists(&keys::history(&id)).unwrap());
    }

    #[test]
    fn test_reason_too_long() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let core = LedgerCore::new(store, 5);
        let wallet = core.create_wallet().unwrap();

        let err = core
            .credit(wallet.wallet_id, amount(1), Some("too long"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReason { len: 8, max: 5 }));
        assert_eq!(core.get_balance(wallet.wallet_id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_reset_clears_history() {
        let (core, store) = setup();
        let wallet = core.create_wallet().unwrap();
        for _ in 0..4 {
            core.credit(wallet.wallet_id, amount(5), None).unwrap();
        }

        let receipt = core.reset(wallet.wallet_id).unwrap();
        assert_eq!(receipt.balance, Decimal::ZERO);

        let stored = core.get_balance(wallet.wallet_id).unwrap();
        assert_eq!(stored.balance, Decimal::ZERO);
        assert_eq!(stored.created_at, wallet.created_at);
        assert!(!store.sequence_exists(&keys::history(&wallet.wallet_id)).unwrap());
    }

    #[test]
    fn test_delete_removes_wallet_and_history() {
        let (core, store) = setup();
        let wallet = core.create_wallet().unwrap();
        core.credit(wallet.wallet_id, amount(5), None).unwrap();

        core.delete(wallet.wallet_id).unwrap();

        assert!(matches!(core.get_balance(wallet.wallet_id), Err(Error::NotFound(_))));
        assert!(!store.sequence_exists(&keys::history(&wallet.wallet_id)).unwrap());
        assert!(matches!(core.delete(wallet.wallet_id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_fractional_amounts_are_exact() {
        let (core, _) = setup();
        let wallet = core.create_wallet().unwrap();
        let tenth = Amount::new(Decimal::new(1, 1)).unwrap();

        for _ in 0..3 {
            core.credit(wallet.wallet_id, tenth, None).unwrap();
        }
        let receipt = core
            .debit(wallet.wallet_id, Amount::new(Decimal::new(3, 1)).unwrap(), None)
            .unwrap();
        assert_eq!(receipt.new_balance, Decimal::ZERO);
    }
}
