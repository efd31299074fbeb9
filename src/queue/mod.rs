pub mod in_memory;

use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub use in_memory::InMemoryQueue;

/// Message attribute carrying W3C baggage for the charge request.
pub const BAGGAGE_ATTRIBUTE: &str = "baggage";

/// One delivery of a queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
    pub receipt_handle: String,
    /// How many times this message has been handed out, this delivery included.
    pub receive_count: u32,
    pub attributes: HashMap<String, String>,
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Long-polls for up to `max_messages`, waiting at most `wait` when the
    /// queue is empty. An empty vec is a normal result.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, TransportError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), TransportError>;

    /// Enqueues a message and returns its id.
    async fn send(
        &self,
        body: String,
        attributes: HashMap<String, String>,
    ) -> Result<String, TransportError>;
}

pub type SharedTransport = Arc<dyn QueueTransport>;

/// Opens the transport named by `queue_url`. Only `memory://` queues are
/// served in-process.
pub fn open_transport(
    queue_url: &str,
    visibility_timeout: Duration,
) -> Result<SharedTransport, TransportError> {
    let url = Url::parse(queue_url).map_err(|e| TransportError::Receive(e.to_string()))?;
    match url.scheme() {
        "memory" => {
            let name = url.host_str().unwrap_or("default");
            Ok(Arc::new(InMemoryQueue::new(name, visibility_timeout)))
        }
        other => Err(TransportError::Receive(format!(
            "unsupported queue scheme '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_transport_schemes() {
        assert!(open_transport("memory://charges", Duration::from_secs(30)).is_ok());
        assert!(open_transport("https://sqs.example.com/q", Duration::from_secs(30)).is_err());
        assert!(open_transport("::nope::", Duration::from_secs(30)).is_err());
    }
}
