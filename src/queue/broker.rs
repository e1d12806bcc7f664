use crate::proto::QueuedMessage;
use crate::queue::store::{FjallQueue, QueueError, now_ms};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// MessageEnvelope wraps a QueuedMessage with its sequence number
#[derive(Clone, Debug)]
pub struct MessageEnvelope {
    pub seq: u64,
    pub message: QueuedMessage,
}

/// TaskBroker hands published messages to the consumer pool
///
/// Architecture:
/// 1. Scheduler calls `broker.enqueue(topic, payload)`
/// 2. Broker persists the message to FjallQueue (atomic, get seq)
/// 3. Broker sends MessageEnvelope{seq, message} to a consumer via mpsc channel
/// 4. Round-robin distribution across consumers
/// 5. Bounded channels; a full channel never blocks the publisher
///
/// The broker is not a separate task; distribution happens inside
/// `enqueue` via `try_send`, and a busy consumer gets the envelope from a
/// background hand-off instead.
pub struct TaskBroker {
    queue: Arc<FjallQueue>,
    consumer_channels: Vec<mpsc::Sender<MessageEnvelope>>,
    next_consumer: AtomicUsize,
}

impl TaskBroker {
    /// Create a new TaskBroker with consumer channels
    ///
    /// Returns the broker and one receiver per consumer.
    pub fn new(
        queue: Arc<FjallQueue>,
        num_consumers: usize,
        channel_size: usize,
    ) -> (Self, Vec<mpsc::Receiver<MessageEnvelope>>) {
        let num_consumers = num_consumers.max(1);
        info!(num_consumers, channel_size, "Creating TaskBroker with consumer channels");

        let mut consumer_channels = Vec::with_capacity(num_consumers);
        let mut receivers = Vec::with_capacity(num_consumers);

        for consumer_id in 0..num_consumers {
            let (tx, rx) = mpsc::channel(channel_size.max(1));
            consumer_channels.push(tx);
            receivers.push(rx);
            debug!(consumer_id, "Created consumer channel");
        }

        let broker = Self {
            queue,
            consumer_channels,
            next_consumer: AtomicUsize::new(0),
        };

        (broker, receivers)
    }

    pub fn queue(&self) -> &Arc<FjallQueue> {
        &self.queue
    }

    /// Persist a payload on a topic and distribute it
    ///
    /// Returns the sequence number. A closed consumer channel is not an
    /// error: the message stays pending and is redelivered on restart.
    pub async fn enqueue(&self, topic: &str, payload: Vec<u8>) -> Result<u64, QueueError> {
        let message = QueuedMessage {
            topic: topic.to_string(),
            payload,
            enqueued_at_ms: now_ms(),
        };
        let seq = self.queue.enqueue(&message)?;

        self.dispatch(MessageEnvelope { seq, message });
        Ok(seq)
    }

    /// Push every unacknowledged message back to the consumers
    ///
    /// Called once at startup, after the consumers are running.
    pub async fn redeliver_pending(&self, limit: usize) -> Result<usize, QueueError> {
        let pending = self.queue.pending(limit)?;
        let count = pending.len();

        for (seq, message) in pending {
            self.dispatch(MessageEnvelope { seq, message });
        }

        if count > 0 {
            info!(count, "Redelivered pending messages");
        }
        Ok(count)
    }

    fn dispatch(&self, envelope: MessageEnvelope) {
        let seq = envelope.seq;
        let idx = self.next_consumer.fetch_add(1, Ordering::Relaxed) % self.consumer_channels.len();
        let channel = &self.consumer_channels[idx];

        match channel.try_send(envelope) {
            Ok(()) => debug!(seq, consumer = idx, "Message sent to consumer"),
            Err(TrySendError::Full(envelope)) => {
                debug!(seq, consumer = idx, "Consumer busy, handing message off in the background");
                let channel = channel.clone();
                tokio::spawn(async move {
                    if channel.send(envelope).await.is_err() {
                        warn!(seq, consumer = idx, "Consumer channel closed, message left pending");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                warn!(seq, consumer = idx, "Consumer channel closed, message left pending")
            }
        }
    }

    pub fn num_consumers(&self) -> usize {
        self.consumer_channels.len()
    }

    /// Every consumer channel is open and the queue is readable
    pub fn health_check(&self) -> bool {
        self.consumer_channels.iter().all(|ch| !ch.is_closed()) && self.queue.health_check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TOPIC: &str = "media-validation";

    fn open_queue(dir: &TempDir) -> Arc<FjallQueue> {
        Arc::new(FjallQueue::open(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn test_broker_enqueue() {
        let temp_dir = TempDir::new().unwrap();
        let (broker, mut receivers) = TaskBroker::new(open_queue(&temp_dir), 2, 10);

        let seq = broker.enqueue(TOPIC, b"first".to_vec()).await.unwrap();
        assert_eq!(seq, 0);

        let envelope = receivers[0].recv().await.unwrap();
        assert_eq!(envelope.seq, 0);
        assert_eq!(envelope.message.topic, TOPIC);
        assert_eq!(envelope.message.payload, b"first");

        broker.enqueue(TOPIC, b"second".to_vec()).await.unwrap();
        let envelope = receivers[1].recv().await.unwrap();
        assert_eq!(envelope.seq, 1);
    }

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let temp_dir = TempDir::new().unwrap();
        let (broker, mut receivers) = TaskBroker::new(open_queue(&temp_dir), 3, 10);

        for i in 0..6u8 {
            broker.enqueue(TOPIC, vec![i]).await.unwrap();
        }

        for consumer in 0..3 {
            let first = receivers[consumer].recv().await.unwrap();
            let second = receivers[consumer].recv().await.unwrap();
            assert_eq!(first.seq, consumer as u64);
            assert_eq!(second.seq, (consumer + 3) as u64);
        }
    }

    #[tokio::test]
    async fn test_persistence_before_distribution() {
        let temp_dir = TempDir::new().unwrap();
        let queue = open_queue(&temp_dir);
        let (broker, receivers) = TaskBroker::new(queue.clone(), 1, 10);
        drop(receivers);

        let seq = broker.enqueue(TOPIC, b"kept".to_vec()).await.unwrap();

        let retrieved = queue.get_message(seq).unwrap().unwrap();
        assert_eq!(retrieved.payload, b"kept");
        assert!(!broker.health_check());
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block_enqueue() {
        let temp_dir = TempDir::new().unwrap();
        let (broker, mut receivers) = TaskBroker::new(open_queue(&temp_dir), 1, 1);

        // Nobody is receiving yet; the channel holds one envelope.
        let seqs = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            let mut seqs = Vec::new();
            for i in 0..3u8 {
                seqs.push(broker.enqueue(TOPIC, vec![i]).await.unwrap());
            }
            seqs
        })
        .await
        .expect("enqueue blocked on a full channel");
        assert_eq!(seqs, vec![0, 1, 2]);

        let mut delivered = Vec::new();
        for _ in 0..3 {
            delivered.push(receivers[0].recv().await.unwrap().seq);
        }
        delivered.sort_unstable();
        assert_eq!(delivered, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_redeliver_skips_acknowledged() {
        let temp_dir = TempDir::new().unwrap();
        let queue = open_queue(&temp_dir);
        let (broker, mut receivers) = TaskBroker::new(queue.clone(), 1, 10);

        let done = broker.enqueue(TOPIC, b"done".to_vec()).await.unwrap();
        broker.enqueue(TOPIC, b"open".to_vec()).await.unwrap();
        receivers[0].recv().await.unwrap();
        receivers[0].recv().await.unwrap();
        queue.ack(done).unwrap();

        assert_eq!(broker.redeliver_pending(100).await.unwrap(), 1);
        let envelope = receivers[0].recv().await.unwrap();
        assert_eq!(envelope.message.payload, b"open");
    }
}
