//! Configuration for the wallet ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// History reader configuration
    pub history: HistoryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallets"),
            service_name: "wallet-ledger".to_string(),
            rocksdb: RocksDbConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// How long a transaction waits on a wallet row lock before giving up (ms)
    pub lock_timeout_ms: i64,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            lock_timeout_ms: 1_000,
            enable_statistics: false,
        }
    }
}

/// History reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Page size used when the caller gives none (or an invalid one)
    pub default_page_size: u64,

    /// Maximum length of a transaction reason (characters)
    pub max_reason_len: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_reason_len: 500,
        }
    }
}

impl LedgerConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LedgerConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = LedgerConfig::default();

        if let Ok(data_dir) = std::env::var("WALLET_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("WALLET_LEDGER_LOCK_TIMEOUT_MS") {
            config.rocksdb.lock_timeout_ms = parse_env("WALLET_LEDGER_LOCK_TIMEOUT_MS", &timeout)?;
        }

        if let Ok(size) = std::env::var("WALLET_LEDGER_DEFAULT_PAGE_SIZE") {
            config.history.default_page_size = parse_env("WALLET_LEDGER_DEFAULT_PAGE_SIZE", &size)?;
        }

        if let Ok(len) = std::env::var("WALLET_LEDGER_MAX_REASON_LEN") {
            config.history.max_reason_len = parse_env("WALLET_LEDGER_MAX_REASON_LEN", &len)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.rocksdb.lock_timeout_ms <= 0 {
            return Err(crate::Error::Config(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.history.default_page_size == 0 {
            return Err(crate::Error::Config(
                "default_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("{} has invalid value {:?}", name, value)))
}
