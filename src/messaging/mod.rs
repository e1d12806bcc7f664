//! Message publishing abstraction
//!
//! The scheduler publishes through `MessageProducer`; in-process the
//! `TaskBroker` backs it with the Fjall queue.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::queue::TaskBroker;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

/// Message producer for publishing task descriptors
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publish message to a topic
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()>;

    /// Health check
    async fn health(&self) -> bool;
}

#[async_trait]
impl MessageProducer for TaskBroker {
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        self.enqueue(topic, message)
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::PublishFailed(e.to_string()))
    }

    async fn health(&self) -> bool {
        self.health_check()
    }
}

/// Recording producer for tests and dry runs
#[derive(Debug, Default)]
pub struct MockProducer {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A producer whose every publish fails
    pub fn failing() -> Self {
        let producer = Self::default();
        producer.set_failing(true);
        producer
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything published so far, in order
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageProducer for MockProducer {
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessagingError::ConnectionError("mock producer is down".to_string()));
        }

        tracing::info!(topic, size = message.len(), "Mock publish");
        if let Ok(mut published) = self.published.lock() {
            published.push((topic.to_string(), message));
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FjallQueue;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mock_records_messages() {
        let producer = MockProducer::new();
        producer.publish("topic", vec![1, 2]).await.unwrap();

        assert_eq!(producer.published(), vec![("topic".to_string(), vec![1, 2])]);
        assert!(producer.health().await);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let producer = MockProducer::failing();
        assert!(producer.publish("topic", vec![]).await.is_err());
        assert!(producer.published().is_empty());
        assert!(!producer.health().await);
    }

    #[tokio::test]
    async fn test_broker_as_producer() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(FjallQueue::open(temp_dir.path()).unwrap());
        let (broker, mut receivers) = TaskBroker::new(queue, 1, 4);
        let producer: Arc<dyn MessageProducer> = Arc::new(broker);

        producer.publish("media-validation", b"hi".to_vec()).await.unwrap();

        let envelope = receivers[0].recv().await.unwrap();
        assert_eq!(envelope.message.payload, b"hi");
        assert!(producer.health().await);
    }
}
