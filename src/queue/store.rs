use crate::proto::{DeadLetter, QueuedMessage};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use prost::Message;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),

    #[error("Message not found: seq={0}")]
    MessageNotFound(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// FjallQueue persists topic messages and dead letters using Fjall
///
/// Architecture:
/// - `messages` partition: u64 (big-endian) → QueuedMessage (protobuf)
/// - `metadata` partition: "next_seq" → u64 (atomic counter)
/// - `dlq` partition: u64 (big-endian) → DeadLetter (protobuf)
///
/// A message stays in `messages` until the consumer acknowledges it, so
/// whatever is left there after a restart is pending delivery.
pub struct FjallQueue {
    keyspace: Keyspace,
    messages: PartitionHandle,
    metadata: PartitionHandle,
    dlq: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
}

impl FjallQueue {
    /// Open or create a new FjallQueue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening FjallQueue at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let messages = keyspace.open_partition("messages", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;
        let dlq = keyspace.open_partition("dlq", PartitionCreateOptions::default())?;

        let current_seq = metadata.get(b"next_seq")?.map_or(0, |bytes| decode_seq(&bytes));

        info!("FjallQueue opened, current sequence: {}", current_seq);

        Ok(Self {
            keyspace,
            messages,
            metadata,
            dlq,
            seq_counter: Arc::new(AtomicU64::new(current_seq)),
        })
    }

    /// Persist a message and return its sequence number
    ///
    /// The message and the advanced counter are written in one batch.
    pub fn enqueue(&self, message: &QueuedMessage) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        let mut batch = self.keyspace.batch();
        batch.insert(&self.messages, seq.to_be_bytes(), message.encode_to_vec());
        batch.insert(&self.metadata, b"next_seq", (seq + 1).to_be_bytes());
        batch.commit()?;

        debug!(seq, topic = %message.topic, "Message enqueued");

        Ok(seq)
    }

    /// Retrieve a pending message by sequence number
    pub fn get_message(&self, seq: u64) -> Result<Option<QueuedMessage>> {
        match self.messages.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(QueuedMessage::decode(&*bytes)?)),
            None => Ok(None),
        }
    }

    /// Mark a message handled
    pub fn ack(&self, seq: u64) -> Result<()> {
        self.messages.remove(seq.to_be_bytes())?;
        debug!(seq, "Message acknowledged");
        Ok(())
    }

    /// Messages not yet acknowledged, oldest first
    pub fn pending(&self, limit: usize) -> Result<Vec<(u64, QueuedMessage)>> {
        let mut results = Vec::new();

        for item in self.messages.iter().take(limit) {
            let (key, value) = item?;
            results.push((decode_seq(&key), QueuedMessage::decode(&*value)?));
        }

        Ok(results)
    }

    /// Move a message to the Dead Letter Queue (DLQ)
    ///
    /// Used for messages that can never be handled; there is no retry.
    pub fn move_to_dlq(&self, seq: u64, failure_code: &str, failure_message: &str) -> Result<()> {
        let message = self
            .get_message(seq)?
            .ok_or(QueueError::MessageNotFound(seq))?;

        let letter = DeadLetter {
            message: Some(message),
            failure_code: failure_code.to_string(),
            failure_message: failure_message.to_string(),
            failed_at_ms: now_ms(),
        };

        let mut batch = self.keyspace.batch();
        batch.insert(&self.dlq, seq.to_be_bytes(), letter.encode_to_vec());
        batch.remove(&self.messages, seq.to_be_bytes());
        batch.commit()?;

        info!(seq, failure_code, "Message moved to DLQ");
        Ok(())
    }

    /// Get a dead letter by sequence number
    pub fn get_dlq(&self, seq: u64) -> Result<Option<DeadLetter>> {
        match self.dlq.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(DeadLetter::decode(&*bytes)?)),
            None => Ok(None),
        }
    }

    /// List dead letters (for debugging/inspection)
    pub fn list_dlq(&self, limit: usize) -> Result<Vec<(u64, DeadLetter)>> {
        let mut results = Vec::new();

        for item in self.dlq.iter().take(limit) {
            let (key, value) = item?;
            results.push((decode_seq(&key), DeadLetter::decode(&*value)?));
        }

        Ok(results)
    }

    /// Get current sequence counter value
    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify database is accessible
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"next_seq")?;
        Ok(())
    }
}

fn decode_seq(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(bytes.try_into().unwrap_or([0u8; 8]))
}

/// Current Unix timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
