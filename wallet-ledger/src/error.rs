//! Error types for the wallet ledger

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Wallet does not exist (never created, or deleted)
    #[error("Wallet not found: {0}")]
    NotFound(Uuid),

    /// Amount is non-positive, non-finite or unparsable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Reason annotation exceeds the configured bound
    #[error("Reason too long: {len} characters (max {max})")]
    InvalidReason {
        /// Length of the rejected reason
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Wallet id is not a UUID
    #[error("Invalid wallet ID format: {0}")]
    InvalidWalletId(String),

    /// Debit would drive the balance negative
    #[error("Insufficient funds: balance {current_balance}, requested {requested_amount}")]
    InsufficientFunds {
        /// Balance observed inside the atomic unit
        current_balance: Decimal,
        /// Amount the caller tried to debit
        requested_amount: Decimal,
    },

    /// The store adapter failed to complete an operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored record failed to decode
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Replay of the history does not reproduce stored balances
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A derived aggregate does not fit in the decimal range
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller caused the failure (as opposed to the service or its store)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidAmount(_)
                | Error::InvalidReason { .. }
                | Error::InvalidWalletId(_)
                | Error::InsufficientFunds { .. }
        )
    }

    /// Message safe to hand back to a remote caller
    ///
    /// Store, codec and IO details are replaced with a generic message.
    pub fn client_message(&self) -> String {
        match self {
            Error::NotFound(_) => "Wallet not found".to_string(),
            Error::StoreUnavailable(_) | Error::Serialization(_) | Error::Io(_) => {
                "Database operation failed".to_string()
            }
            Error::InvariantViolation(_) | Error::Overflow(_) | Error::Config(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::StoreUnavailable(format!("store task aborted: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(Error::NotFound(Uuid::new_v4()).is_client_error());
        assert!(Error::InsufficientFunds {
            current_balance: Decimal::from(10),
            requested_amount: Decimal::from(20),
        }
        .is_client_error());
        assert!(!Error::StoreUnavailable("down".into()).is_client_error());
    }

    #[test]
    fn test_client_message_hides_store_details() {
        let err = Error::StoreUnavailable("connection refused at 10.0.0.3".into());
        assert_eq!(err.client_message(), "Database operation failed");

        let err = Error::NotFound(Uuid::new_v4());
        assert_eq!(err.client_message(), "Wallet not found");

        let err = Error::Overflow("credit total".into());
        assert!(!err.is_client_error());
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = Error::InsufficientFunds {
            current_balance: Decimal::from(10),
            requested_amount: Decimal::new(2550, 2),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: balance 10, requested 25.50"
        );
    }
}
