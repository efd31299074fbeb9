use crate::error::StoreError;
use crate::models::charge::TransactionRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const LEGACY_CUSTOMER_INDEX: &str = "idx_customer_id";

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, record: TransactionRecord) -> Result<(), StoreError>;

    /// Startup schema adjustment: drops the legacy customer index if present.
    async fn prepare_schema(&self) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn TransactionStore>;

/// Runs the schema adjustment when configured to. Called once, before the
/// consumer starts.
pub async fn run_schema_setup(store: &dyn TransactionStore, enabled: bool) -> Result<(), StoreError> {
    if !enabled {
        info!("Schema setup disabled, skipping");
        return Ok(());
    }
    info!(
        index = LEGACY_CUSTOMER_INDEX,
        table = TRANSACTIONS_TABLE,
        "Running one-time schema setup"
    );
    store.prepare_schema().await
}

#[derive(Default)]
pub struct InMemoryTransactionStore {
    records: DashMap<Uuid, TransactionRecord>,
    schema_runs: AtomicU32,
    index_present: AtomicBool,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            index_present: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn get(&self, transaction_id: &Uuid) -> Option<TransactionRecord> {
        self.records.get(transaction_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn schema_runs(&self) -> u32 {
        self.schema_runs.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, record: TransactionRecord) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(record.transaction_id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(record.transaction_id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn prepare_schema(&self) -> Result<(), StoreError> {
        self.schema_runs.fetch_add(1, Ordering::Relaxed);
        if self.index_present.swap(false, Ordering::Relaxed) {
            info!(index = LEGACY_CUSTOMER_INDEX, "Index dropped");
        } else {
            info!(index = LEGACY_CUSTOMER_INDEX, "Index does not exist, nothing to drop");
        }
        Ok(())
    }
}
