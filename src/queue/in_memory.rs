use super::{QueueMessage, QueueTransport};
use crate::app::config::{MAX_BATCH_SIZE, MAX_VISIBILITY_TIMEOUT_SECS, MAX_WAIT_TIME_SECS};
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
    receive_count: u32,
    visible_at: Instant,
    receipt_handle: Option<String>,
}

/// Process-local queue with SQS delivery semantics: a received message stays
/// hidden for the visibility timeout and comes back if it is not deleted.
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    messages: Mutex<Vec<StoredMessage>>,
    notify: Notify,
}

impl InMemoryQueue {
    /// `visibility_timeout` is capped at the SQS maximum of twelve hours.
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout: visibility_timeout.min(Duration::from_secs(MAX_VISIBILITY_TIMEOUT_SECS)),
            messages: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Messages still owned by the queue, in flight or not.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bodies of every stored message, in enqueue order.
    pub fn bodies(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.body.clone()).collect()
    }

    fn take_visible(&self, max: usize) -> (Vec<QueueMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut messages = self.messages.lock();
        let mut batch = Vec::new();
        let mut next_visible: Option<Instant> = None;

        for stored in messages.iter_mut() {
            if stored.visible_at > now {
                next_visible = Some(next_visible.map_or(stored.visible_at, |t| t.min(stored.visible_at)));
                continue;
            }
            if batch.len() == max {
                continue;
            }
            let handle = Uuid::new_v4().to_string();
            stored.receive_count += 1;
            stored.visible_at = now + self.visibility_timeout;
            stored.receipt_handle = Some(handle.clone());
            batch.push(QueueMessage {
                message_id: stored.message_id.clone(),
                body: stored.body.clone(),
                receipt_handle: handle,
                receive_count: stored.receive_count,
                attributes: stored.attributes.clone(),
            });
        }

        (batch, next_visible)
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, TransportError> {
        if !(1..=MAX_BATCH_SIZE).contains(&max_messages) {
            return Err(TransportError::Receive(format!(
                "max_messages must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }

        if wait > Duration::from_secs(MAX_WAIT_TIME_SECS) {
            return Err(TransportError::Receive(format!(
                "wait time must not exceed {}s",
                MAX_WAIT_TIME_SECS
            )));
        }

        let deadline = Instant::now() + wait;
        loop {
            // register before looking so a send between the check and the wait is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_visible) = self.take_visible(max_messages);
            if !batch.is_empty() {
                debug!(queue = %self.name, count = batch.len(), "Delivering messages");
                return Ok(batch);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), TransportError> {
        let mut messages = self.messages.lock();
        let position = messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| TransportError::InvalidReceiptHandle(receipt_handle.to_string()))?;
        messages.remove(position);
        Ok(())
    }

    async fn send(
        &self,
        body: String,
        attributes: HashMap<String, String>,
    ) -> Result<String, TransportError> {
        let message_id = Uuid::new_v4().to_string();
        self.messages.lock().push(StoredMessage {
            message_id: message_id.clone(),
            body,
            attributes,
            receive_count: 0,
            visible_at: Instant::now(),
            receipt_handle: None,
        });
        self.notify.notify_waiters();
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(20);

    #[tokio::test(start_paused = true)]
    async fn test_receive_in_order_and_delete() {
        let queue = InMemoryQueue::new("q", Duration::from_secs(30));
        for body in ["a", "b", "c"] {
            queue.send(body.to_string(), HashMap::new()).await.unwrap();
        }

        let batch = queue.receive(2, WAIT).await.unwrap();
        let bodies: Vec<_> = batch.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["a", "b"]);
        assert!(batch.iter().all(|m| m.receive_count == 1));

        queue.delete(&batch[0].receipt_handle).await.unwrap();
        assert_eq!(queue.len(), 2);
        assert!(matches!(
            queue.delete(&batch[0].receipt_handle).await,
            Err(TransportError::InvalidReceiptHandle(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_long_poll_times_out() {
        let queue = InMemoryQueue::new("q", Duration::from_secs(30));
        let started = Instant::now();
        let batch = queue.receive(10, WAIT).await.unwrap();
        assert!(batch.is_empty());
        assert!(started.elapsed() >= WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_send() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30)));
        let receiver = tokio::spawn({
            let queue = queue.clone();
            async move { queue.receive(10, WAIT).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.send("late".to_string(), HashMap::new()).await.unwrap();

        let batch = receiver.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_is_redelivered() {
        let queue = InMemoryQueue::new("q", Duration::from_secs(30));
        queue.send("retry me".to_string(), HashMap::new()).await.unwrap();

        let first = queue.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.receive(1, Duration::ZERO).await.unwrap().is_empty());

        let second = queue.receive(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);
        assert_ne!(first[0].receipt_handle, second[0].receipt_handle);

        // the first delivery's handle is stale now
        assert!(queue.delete(&first[0].receipt_handle).await.is_err());
        queue.delete(&second[0].receipt_handle).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_batch() {
        let queue = InMemoryQueue::new("q", Duration::from_secs(30));
        tokio_test::assert_err!(queue.receive(0, Duration::ZERO).await);
        tokio_test::assert_err!(queue.receive(11, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_rejects_oversized_wait() {
        let queue = InMemoryQueue::new("q", Duration::from_secs(30));
        tokio_test::assert_err!(queue.receive(1, Duration::from_secs(21)).await);
        tokio_test::assert_err!(queue.receive(1, Duration::from_secs(u64::MAX)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_visibility_timeout_is_capped() {
        let queue = InMemoryQueue::new("q", Duration::from_secs(u64::MAX));
        queue.send("x".to_string(), HashMap::new()).await.unwrap();
        let batch = queue.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(queue.receive(1, Duration::ZERO).await.unwrap().is_empty());
    }
}
