use crate::app::config::Config;
use crate::error::{ProcessingError, TransportError};
use crate::models::charge::{ChargeRequest, RequestContext, TransactionOutcome, TransactionRecord};
use crate::queue::{QueueMessage, SharedTransport, BAGGAGE_ATTRIBUTE};
use crate::services::atomic_metrics::ChargeMetrics;
use crate::services::charge_processor::ChargeProcessor;
use crate::services::transaction_store::SharedStore;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const POLL_BACKOFF_BASE: Duration = Duration::from_secs(1);
const POLL_BACKOFF_MAX: Duration = Duration::from_secs(30);

pub const DEAD_LETTER_REASON_ATTRIBUTE: &str = "dead_letter_reason";
pub const SOURCE_MESSAGE_ID_ATTRIBUTE: &str = "source_message_id";

/// Bounds for the random pause between a charge and its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    pub min: Duration,
    pub max: Duration,
}

impl JitterRange {
    pub const NONE: JitterRange = JitterRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Uniform in `[min, max)`; `min` when the range is empty.
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    pub wait_time: Duration,
    pub max_receive_count: u32,
    pub jitter: JitterRange,
    pub slow_warn: Duration,
    pub slow_error: Duration,
}

impl From<&Config> for ConsumerSettings {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            wait_time: config.wait_time(),
            max_receive_count: config.max_receive_count,
            jitter: JitterRange {
                min: Duration::from_millis(config.jitter_min_ms),
                max: Duration::from_millis(config.jitter_max_ms),
            },
            slow_warn: Duration::from_millis(config.slow_warn_ms),
            slow_error: Duration::from_millis(config.slow_error_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyLevel {
    Normal,
    Slow,
    VerySlow,
}

impl ConsumerSettings {
    pub fn latency_level(&self, elapsed: Duration) -> LatencyLevel {
        if elapsed > self.slow_error {
            LatencyLevel::VerySlow
        } else if elapsed > self.slow_warn {
            LatencyLevel::Slow
        } else {
            LatencyLevel::Normal
        }
    }
}

/// Result of one polling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub deleted: usize,
    pub retained: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageOutcome {
    Deleted,
    Retained,
    DeadLettered,
}

pub fn poll_error_backoff(consecutive_errors: u32) -> Duration {
    let exponent = consecutive_errors.saturating_sub(1).min(16);
    POLL_BACKOFF_BASE
        .saturating_mul(1u32 << exponent)
        .min(POLL_BACKOFF_MAX)
}

/// Long-polls the charge queue and processes each message in order.
///
/// A message is deleted only after it was charged and persisted. Any failure
/// leaves it for the transport to redeliver, until its receive count passes
/// `max_receive_count` and it is moved to the dead-letter queue.
pub struct QueueConsumer {
    transport: SharedTransport,
    dead_letter: Option<SharedTransport>,
    processor: Arc<ChargeProcessor>,
    store: SharedStore,
    metrics: Arc<ChargeMetrics>,
    settings: ConsumerSettings,
}

impl QueueConsumer {
    pub fn new(
        transport: SharedTransport,
        processor: Arc<ChargeProcessor>,
        store: SharedStore,
        metrics: Arc<ChargeMetrics>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            transport,
            dead_letter: None,
            processor,
            store,
            metrics,
            settings,
        }
    }

    pub fn with_dead_letter_queue(mut self, dead_letter: SharedTransport) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    /// Polls until `shutdown` flips to `true` (or its sender is dropped).
    /// A batch already received is finished before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.settings.batch_size,
            wait_time_secs = self.settings.wait_time.as_secs(),
            max_receive_count = self.settings.max_receive_count,
            dead_letter = self.dead_letter.is_some(),
            "Starting charge consumer"
        );

        let mut consecutive_errors: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                result = self.transport.receive(self.settings.batch_size, self.settings.wait_time) => result,
                _ = shutdown.changed() => break,
            };

            match received {
                Ok(messages) => {
                    if consecutive_errors > 0 {
                        info!(previous_errors = consecutive_errors, "Queue polling recovered");
                    }
                    consecutive_errors = 0;

                    if !messages.is_empty() {
                        let report = self.process_batch(messages).await;
                        debug!(?report, "Batch processed");
                    }
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let backoff = poll_error_backoff(consecutive_errors);
                    error!(
                        error = %e,
                        consecutive_errors = consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "Failed to receive messages, backing off"
                    );
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!("Charge consumer stopped");
    }

    /// One receive followed by processing of whatever came back.
    pub async fn poll_once(&self) -> Result<BatchReport, TransportError> {
        let messages = self
            .transport
            .receive(self.settings.batch_size, self.settings.wait_time)
            .await?;
        Ok(self.process_batch(messages).await)
    }

    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len(),
            ..BatchReport::default()
        };

        for message in &messages {
            match self.process_message(message).await {
                MessageOutcome::Deleted => report.deleted += 1,
                MessageOutcome::Retained => report.retained += 1,
                MessageOutcome::DeadLettered => report.dead_lettered += 1,
            }
        }
        report
    }

    async fn process_message(&self, message: &QueueMessage) -> MessageOutcome {
        let started = Instant::now();
        self.metrics.increment_received();

        if message.receive_count > self.settings.max_receive_count {
            match &self.dead_letter {
                Some(dead_letter) => return self.dead_letter_message(dead_letter, message).await,
                None => warn!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    "Message exceeded max receive count but no dead-letter queue is configured"
                ),
            }
        }

        match self.charge_message(message).await {
            Ok(outcome) => {
                self.metrics.increment_charged();
                let elapsed = started.elapsed();
                let elapsed_ms = elapsed.as_millis() as u64;
                match self.settings.latency_level(elapsed) {
                    LatencyLevel::Normal => info!(
                        message_id = %message.message_id,
                        transaction_id = %outcome.transaction_id,
                        elapsed_ms,
                        "Charge processed successfully."
                    ),
                    LatencyLevel::Slow => warn!(
                        message_id = %message.message_id,
                        transaction_id = %outcome.transaction_id,
                        elapsed_ms,
                        "Charge processing is taking a lot of time"
                    ),
                    LatencyLevel::VerySlow => error!(
                        message_id = %message.message_id,
                        transaction_id = %outcome.transaction_id,
                        elapsed_ms,
                        "Charge processing exceeded the error threshold"
                    ),
                }
                MessageOutcome::Deleted
            }
            Err(e) => {
                self.metrics.increment_failed();
                error!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    error = %e,
                    "Error processing charge."
                );
                MessageOutcome::Retained
            }
        }
    }

    async fn charge_message(&self, message: &QueueMessage) -> Result<TransactionOutcome, ProcessingError> {
        let request = ChargeRequest::from_message_body(&message.body)?;
        info!(
            message_id = %message.message_id,
            amount = %request.amount,
            "Charge request received from queue."
        );

        let context = message
            .attributes
            .get(BAGGAGE_ATTRIBUTE)
            .map(|header| RequestContext::from_baggage(header))
            .unwrap_or_default();

        let outcome = self.processor.charge(&request, &context)?;
        self.store.insert(TransactionRecord::from(&outcome)).await?;
        // counted once stored, so a redelivery after a failed write is not counted twice
        self.metrics.record_transaction(&outcome.amount.currency_code);

        sleep(self.settings.jitter.sample()).await;

        self.transport.delete(&message.receipt_handle).await?;
        Ok(outcome)
    }

    async fn dead_letter_message(&self, dead_letter: &SharedTransport, message: &QueueMessage) -> MessageOutcome {
        let mut attributes = message.attributes.clone();
        attributes.insert(
            DEAD_LETTER_REASON_ATTRIBUTE.to_string(),
            format!("received {} times", message.receive_count),
        );
        attributes.insert(SOURCE_MESSAGE_ID_ATTRIBUTE.to_string(), message.message_id.clone());

        if let Err(e) = dead_letter.send(message.body.clone(), attributes).await {
            error!(message_id = %message.message_id, error = %e, "Failed to dead-letter message");
            return MessageOutcome::Retained;
        }
        if let Err(e) = self.transport.delete(&message.receipt_handle).await {
            // it is on the dead-letter queue already; a redelivery will be dead-lettered again
            error!(message_id = %message.message_id, error = %e, "Failed to delete dead-lettered message");
            return MessageOutcome::Retained;
        }

        self.metrics.increment_dead_lettered();
        warn!(
            message_id = %message.message_id,
            receive_count = message.receive_count,
            max_receive_count = self.settings.max_receive_count,
            "Message moved to dead-letter queue"
        );
        MessageOutcome::DeadLettered
    }
}
