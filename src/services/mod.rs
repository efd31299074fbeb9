pub mod atomic_metrics;
pub mod charge_processor;
pub mod queue_consumer;
pub mod transaction_store;

pub use atomic_metrics::ChargeMetrics;
pub use charge_processor::ChargeProcessor;
pub use queue_consumer::{BatchReport, ConsumerSettings, JitterRange, QueueConsumer};
pub use transaction_store::{InMemoryTransactionStore, TransactionStore};
