//! Wallet Ledger
//!
//! Per-wallet balances with an append-only transaction history, kept in a
//! transactional key-value store.
//!
//! # Architecture
//!
//! - **Store Adapter** ([`storage`]): RocksDB `TransactionDB` or in-memory, behind one trait
//! - **Ledger Core** ([`ledger`]): create/credit/debit/reset/delete, one atomic batch each
//! - **History Reader** ([`history`]): pages, summaries, CSV/JSON export, replay check
//! - **Facade** ([`WalletLedger`]): async entry point with tracing and metrics
//!
//! # Invariants
//!
//! - Balance is never negative
//! - A balance change and its history entry commit together or not at all
//! - Replaying the history from zero reproduces every recorded balance
//! - History is append-only until the wallet is reset or deleted

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod service;
pub mod storage;
pub mod types;

// Re-exports
pub use config::LedgerConfig;
pub use error::{Error, Result};
pub use history::{HistoryReader, PageRequest};
pub use ledger::LedgerCore;
pub use metrics::Metrics;
pub use service::{parse_wallet_id, WalletLedger};
pub use storage::{KeyValueStore, MemoryStore, RocksStore};
pub use types::{
    Amount, CreditReceipt, DebitReceipt, DeleteReceipt, Export, ExportFormat, ResetReceipt,
    Transaction, TransactionPage, TransactionType, Wallet, WalletSummary,
};
