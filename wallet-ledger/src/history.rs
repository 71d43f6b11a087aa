//! History reader: pagination, summaries and export
//!
//! Read-only. Nothing here takes a row lock. Each call reads the wallet record
//! and its history from one point in time, so a balance is never paired with
//! a history it does not belong to.
//!
//! Pagination works on newest-first positions: position 0 is the most recent
//! entry. A page covers positions `[offset, offset + limit)` intersected with
//! the sequence, so an offset at or past the end gives an empty page.

use crate::{
    storage::{keys, KeyValueStore, SequenceWindow},
    types::{
        now_millis, CsvExport, Export, ExportFormat, ExportRecord, Transaction, TransactionPage,
        TransactionType, Wallet, WalletSummary,
    },
    Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// CSV header row
pub const CSV_HEADER: &str = "transaction_id,type,amount,reason,timestamp,balance_after_transaction";

/// Default page size
pub const DEFAULT_LIMIT: u64 = 20;

/// Page window over a wallet's history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of transactions returned
    pub limit: u64,
    /// Entries skipped back from the newest
    pub offset: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    /// Explicit window
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// Build a window from raw query values
    ///
    /// Only the leading integer of each value counts (`"5abc"` is 5, `"1.5"` is 1).
    /// Missing, non-numeric and negative values fall back to `default_limit` and 0.
    /// A limit of 0 is treated as missing.
    pub fn from_query(limit: Option<&str>, offset: Option<&str>, default_limit: u64) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(parse_leading_int);

        Self {
            limit: parse(limit).filter(|&l| l > 0).unwrap_or(default_limit),
            offset: parse(offset).unwrap_or(0),
        }
    }
}

/// Leading base-10 integer of `raw`, ignoring what follows it
///
/// `None` when there are no leading digits or the value is negative. Values past
/// `u64::MAX` saturate.
fn parse_leading_int(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..digits_end];
    if digits.is_empty() {
        return None;
    }

    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    if negative && value > 0 {
        return None;
    }
    Some(value)
}

/// Read side of the ledger
pub struct HistoryReader {
    store: Arc<dyn KeyValueStore>,
}

impl HistoryReader {
    /// Create a reader over `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// One page of history, newest first
    pub fn get_range(&self, wallet_id: Uuid, page: PageRequest) -> Result<TransactionPage> {
        let window = if page.limit == 0 {
            // valid empty window: newest position after the oldest one
            SequenceWindow::FromEnd {
                start_from_end: 0,
                end_from_end: 1,
            }
        } else {
            SequenceWindow::FromEnd {
                start_from_end: page.offset.saturating_add(page.limit - 1),
                end_from_end: page.offset,
            }
        };

        let (_, mut transactions) = self.read_wallet(wallet_id, window)?;
        transactions.reverse();

        tracing::debug!(
            wallet_id = %wallet_id,
            limit = page.limit,
            offset = page.offset,
            count = transactions.len(),
            "Read transaction page"
        );

        Ok(TransactionPage {
            wallet_id,
            count: transactions.len(),
            transactions,
        })
    }

    /// Aggregates over the full history combined with the current wallet record
    pub fn get_summary(&self, wallet_id: Uuid) -> Result<WalletSummary> {
        let (wallet, transactions) = self.read_wallet(wallet_id, SequenceWindow::All)?;

        let mut total_credits = Decimal::ZERO;
        let mut total_debits = Decimal::ZERO;
        let mut last_transaction_timestamp = None;

        for tx in &transactions {
            let total = match tx.transaction_type {
                TransactionType::Credit => &mut total_credits,
                TransactionType::Debit => &mut total_debits,
            };
            *total = total.checked_add(tx.amount).ok_or_else(|| {
                Error::Overflow(format!(
                    "{} total of wallet {} exceeds the decimal range",
                    tx.transaction_type, wallet_id
                ))
            })?;
            if last_transaction_timestamp.map_or(true, |last| tx.timestamp > last) {
                last_transaction_timestamp = Some(tx.timestamp);
            }
        }

        let transaction_count = transactions.len() as u64;
        let average_transaction_size =
            average(total_credits, total_debits, transaction_count).normalize();

        Ok(WalletSummary {
            wallet_id,
            balance: wallet.balance,
            total_credits: total_credits.normalize(),
            total_debits: total_debits.normalize(),
            transaction_count,
            average_transaction_size,
            last_transaction_timestamp,
            created_at: wallet.created_at,
            last_updated: wallet.last_updated,
        })
    }

    /// Full history, oldest first, in the requested format
    pub fn export(&self, wallet_id: Uuid, format: ExportFormat) -> Result<Export> {
        let (_, transactions) = self.read_wallet(wallet_id, SequenceWindow::All)?;

        tracing::info!(
            wallet_id = %wallet_id,
            format = %format,
            count = transactions.len(),
            "Exported transactions"
        );

        Ok(match format {
            ExportFormat::Json => Export::Records(ExportRecord {
                wallet_id,
                exported_at: now_millis(),
                count: transactions.len(),
                transactions,
            }),
            ExportFormat::Csv => Export::Csv(CsvExport {
                filename: format!("wallet_{}_transactions.csv", wallet_id),
                body: format_csv(&transactions),
            }),
        })
    }

    /// Replay the history from zero and compare against the stored balances
    pub fn verify_history(&self, wallet_id: Uuid) -> Result<()> {
        let (wallet, transactions) = self.read_wallet(wallet_id, SequenceWindow::All)?;

        let mut running = Decimal::ZERO;
        for (position, tx) in transactions.iter().enumerate() {
            running = running.checked_add(tx.signed_amount()).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "replay overflows at transaction {} at position {}",
                    tx.transaction_id, position
                ))
            })?;
            if running < Decimal::ZERO {
                return Err(Error::InvariantViolation(format!(
                    "balance negative ({}) after transaction {} at position {}",
                    running, tx.transaction_id, position
                )));
            }
            if running != tx.balance_after_transaction {
                return Err(Error::InvariantViolation(format!(
                    "transaction {} at position {} records balance {}, replay gives {}",
                    tx.transaction_id, position, tx.balance_after_transaction, running
                )));
            }
        }

        if running != wallet.balance {
            return Err(Error::InvariantViolation(format!(
                "wallet balance {} does not match replayed balance {}",
                wallet.balance, running
            )));
        }
        Ok(())
    }

    /// Wallet record and a window of its history from one point in time
    fn read_wallet(
        &self,
        wallet_id: Uuid,
        window: SequenceWindow,
    ) -> Result<(Wallet, Vec<Transaction>)> {
        let (record, entries) = self.store.read_consistent(
            &keys::wallet(&wallet_id),
            &keys::history(&wallet_id),
            window,
        )?;
        let wallet = Wallet::from_bytes(&record.ok_or(Error::NotFound(wallet_id))?)?;
        Ok((wallet, decode_all(entries)?))
    }
}

/// Mean transaction size, 0 for an empty history
///
/// Falls back to averaging each total separately when their sum leaves the
/// decimal range. The mean of amounts that each fit cannot exceed `Decimal::MAX`,
/// so a last overflow (from rounding) saturates.
fn average(total_credits: Decimal, total_debits: Decimal, count: u64) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    let count = Decimal::from(count);
    match total_credits.checked_add(total_debits) {
        Some(sum) => sum / count,
        None => (total_credits / count)
            .checked_add(total_debits / count)
            .unwrap_or(Decimal::MAX),
    }
}

fn decode_all(entries: Vec<Vec<u8>>) -> Result<Vec<Transaction>> {
    entries
        .iter()
        .map(|bytes| Transaction::from_bytes(bytes))
        .collect()
}

/// Render transactions as CSV, one row per transaction in the given order
///
/// The reason column is always quoted with embedded quotes doubled. Rows are
/// separated by `\n` without a trailing newline.
pub fn format_csv(transactions: &[Transaction]) -> String {
    let rows: Vec<String> = transactions
        .iter()
        .map(|tx| {
            format!(
                "{},{},{},\"{}\",{},{}",
                tx.transaction_id,
                tx.transaction_type,
                tx.amount,
                tx.reason.replace('"', "\"\""),
                tx.timestamp.timestamp_millis(),
                tx.balance_after_transaction
            )
        })
        .collect();

    format!("{}\n{}", CSV_HEADER, rows.join("\n"))
}
