//! Async facade over the ledger core and history reader
//!
//! # Example
//!
//! ```no_run
//! use wallet_ledger::{Amount, LedgerConfig, WalletLedger};
//!
//! #[tokio::main]
//! async fn main() -> wallet_ledger::Result<()> {
//!     let ledger = WalletLedger::open(LedgerConfig::default())?;
//!
//!     let wallet = ledger.create_wallet().await?;
//!     let amount: Amount = "25.00".parse()?;
//!     ledger.credit(wallet.wallet_id, amount, Some("top-up".into())).await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    history::{HistoryReader, PageRequest},
    ledger::LedgerCore,
    storage::{KeyValueStore, MemoryStore, RocksStore},
    types::{
        Amount, CreditReceipt, DebitReceipt, DeleteReceipt, Export, ExportFormat, ResetReceipt,
        TransactionPage, Wallet, WalletSummary,
    },
    Error, LedgerConfig, Metrics, Result,
};
use std::sync::Arc;
use uuid::Uuid;

/// Parse a caller-supplied wallet id
pub fn parse_wallet_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::InvalidWalletId(raw.to_string()))
}

/// Wallet ledger entry point
///
/// Cheap to clone; clones share the store and metrics.
#[derive(Clone)]
pub struct WalletLedger {
    core: Arc<LedgerCore>,
    history: Arc<HistoryReader>,
    store: Arc<dyn KeyValueStore>,
    metrics: Metrics,
    config: Arc<LedgerConfig>,
}

impl WalletLedger {
    /// Ledger over an injected store
    pub fn new(store: Arc<dyn KeyValueStore>, config: LedgerConfig) -> Self {
        Self {
            core: Arc::new(LedgerCore::new(
                store.clone(),
                config.history.max_reason_len,
            )),
            history: Arc::new(HistoryReader::new(store.clone())),
            store,
            metrics: Metrics::default(),
            config: Arc::new(config),
        }
    }

    /// Open the RocksDB store under `config.data_dir`
    pub fn open(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(RocksStore::open(&config)?);
        Ok(Self::new(store, config))
    }

    /// Ledger over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), LedgerConfig::default())
    }

    /// Replace the metrics collector (e.g. to share one registry)
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Page request from raw query values, using the configured default page size
    pub fn page_request(&self, limit: Option<&str>, offset: Option<&str>) -> PageRequest {
        PageRequest::from_query(limit, offset, self.config.history.default_page_size)
    }

    /// Assign a new wallet
    #[tracing::instrument(skip(self))]
    pub async fn create_wallet(&self) -> Result<Wallet> {
        let wallet = self
            .run("create_wallet", |core, _| core.create_wallet())
            .await?;
        self.metrics.wallets_created.inc();
        Ok(wallet)
    }

    /// Current wallet record
    #[tracing::instrument(skip(self))]
    pub async fn get_balance(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.run("get_balance", move |core, _| core.get_balance(wallet_id))
            .await
    }

    /// Credit a wallet
    #[tracing::instrument(skip(self, reason))]
    pub async fn credit(
        &self,
        wallet_id: Uuid,
        amount: Amount,
        reason: Option<String>,
    ) -> Result<CreditReceipt> {
        let receipt = self
            .run("credit", move |core, _| {
                core.credit(wallet_id, amount, reason.as_deref())
            })
            .await?;
        self.metrics.credits_total.inc();
        Ok(receipt)
    }

    /// Debit a wallet
    #[tracing::instrument(skip(self, reason))]
    pub async fn debit(
        &self,
        wallet_id: Uuid,
        amount: Amount,
        reason: Option<String>,
    ) -> Result<DebitReceipt> {
        let receipt = self
            .run("debit", move |core, _| {
                core.debit(wallet_id, amount, reason.as_deref())
            })
            .await?;
        self.metrics.debits_total.inc();
        Ok(receipt)
    }

    /// Zero the balance and clear the history
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self, wallet_id: Uuid) -> Result<ResetReceipt> {
        let receipt = self
            .run("reset", move |core, _| core.reset(wallet_id))
            .await?;
        self.metrics.wallets_reset.inc();
        Ok(receipt)
    }

    /// Remove the wallet and its history
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, wallet_id: Uuid) -> Result<DeleteReceipt> {
        let receipt = self
            .run("delete", move |core, _| core.delete(wallet_id))
            .await?;
        self.metrics.wallets_deleted.inc();
        Ok(receipt)
    }

    /// One page of history, newest first
    #[tracing::instrument(skip(self))]
    pub async fn get_transactions(
        &self,
        wallet_id: Uuid,
        page: PageRequest,
    ) -> Result<TransactionPage> {
        self.run("get_transactions", move |_, history| {
            history.get_range(wallet_id, page)
        })
        .await
    }

    /// Aggregates over the full history
    #[tracing::instrument(skip(self))]
    pub async fn get_summary(&self, wallet_id: Uuid) -> Result<WalletSummary> {
        self.run("get_summary", move |_, history| {
            history.get_summary(wallet_id)
        })
        .await
    }

    /// Full history in the requested format
    #[tracing::instrument(skip(self))]
    pub async fn export(&self, wallet_id: Uuid, format: ExportFormat) -> Result<Export> {
        self.run("export", move |_, history| history.export(wallet_id, format))
            .await
    }

    /// Replay the history and check it against the stored balances
    #[tracing::instrument(skip(self))]
    pub async fn verify_history(&self, wallet_id: Uuid) -> Result<()> {
        self.run("verify_history", move |_, history| {
            history.verify_history(wallet_id)
        })
        .await
    }

    /// Release this handle on the store
    ///
    /// The store closes once the last clone is gone.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!(store = self.store.name(), "Wallet ledger shutting down");
        drop(self);
        Ok(())
    }

    /// Run a blocking store operation off the async runtime, timing it and
    /// counting failures
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LedgerCore, &HistoryReader) -> Result<T> + Send + 'static,
    {
        let timer = self.metrics.operation(operation).start_timer();
        let core = self.core.clone();
        let history = self.history.clone();

        let result = match tokio::task::spawn_blocking(move || f(&core, &history)).await {
            Ok(result) => result,
            Err(e) => Err(Error::from(e)),
        };
        timer.observe_duration();

        if let Err(e) = &result {
            self.metrics.record_error(e);
            if e.is_client_error() {
                tracing::debug!(operation, error = %e, "Operation rejected");
            } else {
                tracing::error!(operation, error = %e, "Operation failed");
            }
        }
        result
    }
}

impl std::fmt::Debug for WalletLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLedger")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn amount(value: i64) -> Amount {
        Amount::new(Decimal::from(value)).unwrap()
    }

    #[test]
    fn test_parse_wallet_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_wallet_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_wallet_id("not-a-uuid"),
            Err(Error::InvalidWalletId(_))
        ));
    }

    #[tokio::test]
    async fn test_facade_round_trip() {
        let ledger = WalletLedger::in_memory();
        let wallet = ledger.create_wallet().await.unwrap();

        ledger
            .credit(wallet.wallet_id, amount(100), Some("salary".into()))
            .await
            .unwrap();
        let receipt = ledger
            .debit(wallet.wallet_id, amount(30), None)
            .await
            .unwrap();
        assert_eq!(receipt.new_balance, Decimal::from(70));

        let page = ledger
            .get_transactions(wallet.wallet_id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.transactions[0].transaction_id, receipt.transaction_id);

        ledger.verify_history(wallet.wallet_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let ledger = WalletLedger::in_memory();
        let wallet = ledger.create_wallet().await.unwrap();
        ledger
            .credit(wallet.wallet_id, amount(5), None)
            .await
            .unwrap();
        let _ = ledger.debit(wallet.wallet_id, amount(50), None).await;

        let metrics = ledger.metrics();
        assert_eq!(metrics.wallets_created.get(), 1);
        assert_eq!(metrics.credits_total.get(), 1);
        assert_eq!(metrics.debits_total.get(), 0);
        assert_eq!(metrics.insufficient_funds.get(), 1);
        assert_eq!(metrics.operation("debit").get_sample_count(), 1);
    }

    #[tokio::test]
    async fn test_page_request_uses_configured_default() {
        let mut config = LedgerConfig::default();
        config.history.default_page_size = 7;
        let ledger = WalletLedger::new(Arc::new(MemoryStore::new()), config);

        assert_eq!(ledger.page_request(None, Some("3")), PageRequest::new(7, 3));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let ledger = WalletLedger::in_memory();
        let clone = ledger.clone();
        ledger.shutdown().await.unwrap();

        // The clone keeps the store alive
        clone.create_wallet().await.unwrap();
    }
}
