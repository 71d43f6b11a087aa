//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the wallet ledger.
//!
//! # Metrics
//!
//! - `wallet_ledger_wallets_created_total` - Wallets assigned
//! - `wallet_ledger_wallets_deleted_total` - Wallets deleted
//! - `wallet_ledger_wallets_reset_total` - Wallets reset
//! - `wallet_ledger_credits_total` - Committed credits
//! - `wallet_ledger_debits_total` - Committed debits
//! - `wallet_ledger_insufficient_funds_total` - Debits rejected for lack of funds
//! - `wallet_ledger_store_errors_total` - Operations failed by the store adapter
//! - `wallet_ledger_operation_duration_seconds{operation}` - Operation latency

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Wallets assigned
    pub wallets_created: IntCounter,

    /// Wallets deleted
    pub wallets_deleted: IntCounter,

    /// Wallets reset
    pub wallets_reset: IntCounter,

    /// Committed credits
    pub credits_total: IntCounter,

    /// Committed debits
    pub debits_total: IntCounter,

    /// Debits rejected for insufficient funds
    pub insufficient_funds: IntCounter,

    /// Store adapter failures
    pub store_errors: IntCounter,

    /// Operation latency, labelled by operation
    pub operation_duration: HistogramVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let wallets_created = counter(
            "wallet_ledger_wallets_created_total",
            "Total number of wallets assigned",
        )?;
        let wallets_deleted = counter(
            "wallet_ledger_wallets_deleted_total",
            "Total number of wallets deleted",
        )?;
        let wallets_reset = counter(
            "wallet_ledger_wallets_reset_total",
            "Total number of wallet resets",
        )?;
        let credits_total = counter(
            "wallet_ledger_credits_total",
            "Total number of committed credits",
        )?;
        let debits_total = counter(
            "wallet_ledger_debits_total",
            "Total number of committed debits",
        )?;
        let insufficient_funds = counter(
            "wallet_ledger_insufficient_funds_total",
            "Total number of debits rejected for insufficient funds",
        )?;
        let store_errors = counter(
            "wallet_ledger_store_errors_total",
            "Total number of operations failed by the store adapter",
        )?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "wallet_ledger_operation_duration_seconds",
                "Histogram of ledger operation latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            wallets_created,
            wallets_deleted,
            wallets_reset,
            credits_total,
            debits_total,
            insufficient_funds,
            store_errors,
            operation_duration,
            registry,
        })
    }

    /// Latency histogram for one operation
    pub fn operation(&self, operation: &str) -> Histogram {
        self.operation_duration.with_label_values(&[operation])
    }

    /// Count a failed operation when the store is to blame
    pub fn record_error(&self, err: &crate::Error) {
        if matches!(
            err,
            crate::Error::StoreUnavailable(_) | crate::Error::Serialization(_)
        ) {
            self.store_errors.inc();
        }
        if matches!(err, crate::Error::InsufficientFunds { .. }) {
            self.insufficient_funds.inc();
        }
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("wallets_created", &self.wallets_created.get())
            .field("credits_total", &self.credits_total.get())
            .field("debits_total", &self.debits_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.wallets_created.get(), 0);
        assert_eq!(metrics.credits_total.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        // Two collectors must not collide on registration
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.credits_total.inc();
        assert_eq!(a.credits_total.get(), 1);
        assert_eq!(b.credits_total.get(), 0);
    }

    #[test]
    fn test_record_error() {
        let metrics = Metrics::new().unwrap();
        metrics.record_error(&crate::Error::StoreUnavailable("down".into()));
        metrics.record_error(&crate::Error::InsufficientFunds {
            current_balance: Decimal::ZERO,
            requested_amount: Decimal::ONE,
        });
        metrics.record_error(&crate::Error::NotFound(uuid::Uuid::new_v4()));

        assert_eq!(metrics.store_errors.get(), 1);
        assert_eq!(metrics.insufficient_funds.get(), 1);
    }

    #[test]
    fn test_gather_text() {
        let metrics = Metrics::new().unwrap();
        metrics.wallets_created.inc();
        metrics.operation("credit").observe(0.002);

        let text = metrics.gather_text();
        assert!(text.contains("wallet_ledger_wallets_created_total 1"));
        assert!(text.contains("operation=\"credit\""));
    }
}
