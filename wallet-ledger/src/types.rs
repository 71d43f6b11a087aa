//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode) at the store boundary
//! - Exact arithmetic (Decimal for money)
//! - Millisecond timestamps, serialized as integer epoch milliseconds

use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current time truncated to the precision the store keeps
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Validated transaction amount: positive and finite
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Wrap a decimal, rejecting zero and negative values
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "Amount must be positive, got {}",
                value
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// Decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<f64> for Amount {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::InvalidAmount(
                "Amount must be a finite number".to_string(),
            ));
        }
        let decimal = Decimal::try_from(value)
            .map_err(|e| Error::InvalidAmount(format!("Amount out of range: {}", e)))?;
        Self::new(decimal)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| Error::InvalidAmount(format!("Amount must be a valid number: {:?}", s)))?;
        Self::new(decimal)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet ID, immutable once assigned
    pub wallet_id: Uuid,

    /// Current balance, never negative
    pub balance: Decimal,

    /// Creation time, immutable
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Time of the last balance mutation
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl Wallet {
    /// Fresh wallet with a zero balance
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            wallet_id: Uuid::new_v4(),
            balance: Decimal::ZERO,
            created_at: now,
            last_updated: now,
        }
    }

    /// Encode for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from storage
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Balance increased
    Credit,
    /// Balance decreased
    Debit,
}

impl TransactionType {
    /// Lowercase name as exported
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable history entry for one balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub transaction_id: Uuid,

    /// Owning wallet
    pub wallet_id: Uuid,

    /// Credit or debit
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    /// Magnitude of the change, always positive
    pub amount: Decimal,

    /// Free-text annotation (empty when none was given)
    pub reason: String,

    /// Append time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Wallet balance right after this transaction was applied
    pub balance_after_transaction: Decimal,
}

impl Transaction {
    /// Amount with sign applied (debits negative)
    pub fn signed_amount(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }

    /// Encode for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from storage
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Result of a credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditReceipt {
    pub wallet_id: Uuid,
    pub credited_amount: Decimal,
    pub new_balance: Decimal,
    pub transaction_id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Result of a debit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitReceipt {
    pub wallet_id: Uuid,
    pub debited_amount: Decimal,
    pub new_balance: Decimal,
    pub transaction_id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Result of a reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReceipt {
    pub wallet_id: Uuid,
    pub balance: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub reset_at: DateTime<Utc>,
}

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub wallet_id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub deleted_at: DateTime<Utc>,
}

/// One page of history, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub wallet_id: Uuid,
    pub count: usize,
    pub transactions: Vec<Transaction>,
}

/// Aggregates derived from the full history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub wallet_id: Uuid,
    pub balance: Decimal,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub transaction_count: u64,
    pub average_transaction_size: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_transaction_timestamp: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured record (serializable to JSON)
    #[default]
    Json,
    /// Comma-separated text with a fixed header
    Csv,
}

impl ExportFormat {
    /// Parse a caller-supplied format; anything unrecognised falls back to JSON
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Structured export of the full history, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub wallet_id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub exported_at: DateTime<Utc>,
    pub count: usize,
    pub transactions: Vec<Transaction>,
}

/// CSV export with the suggested attachment name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: String,
    pub body: String,
}

/// Export in the requested format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// Structured record
    Records(ExportRecord),
    /// Delimited text
    Csv(CsvExport),
}
