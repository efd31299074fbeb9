use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the charge pipeline.
#[derive(Default)]
pub struct ChargeMetrics {
    received: AtomicU64,
    charged: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
    transactions_by_currency: DashMap<String, AtomicU64>,
}

impl ChargeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_charged(&self) {
        self.charged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// `app.payment.transactions`, keyed by currency.
    pub fn record_transaction(&self, currency_code: &str) {
        self.transactions_by_currency
            .entry(currency_code.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn get_charged(&self) -> u64 {
        self.charged.load(Ordering::Relaxed)
    }

    pub fn get_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn get_dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn get_transactions(&self, currency_code: &str) -> u64 {
        self.transactions_by_currency
            .get(currency_code)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let by_currency: serde_json::Map<String, serde_json::Value> = self
            .transactions_by_currency
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    serde_json::json!(entry.value().load(Ordering::Relaxed)),
                )
            })
            .collect();

        serde_json::json!({
            "received": self.get_received(),
            "charged": self.get_charged(),
            "failed": self.get_failed(),
            "dead_lettered": self.get_dead_lettered(),
            "transactions_by_currency": by_currency,
        })
    }
}
