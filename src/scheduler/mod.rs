//! Validation task scheduling
//!
//! The scheduler persists a queued `ValidationTask`, publishes its id on the
//! task topic and answers status queries from the ledger. The consumer side
//! (`TaskConsumer`) receives published messages, runs the batch worker and
//! records the outcome on the task.
//!
//! State machine: `queued -> running -> completed | failed`. There is no
//! automatic retry; a failed task stays failed until an operator schedules a
//! new one.

mod consumer;
pub mod task;

pub use consumer::TaskConsumer;
pub use task::{TaskStateError, TaskStatus, ValidationTask};

use chrono::{DateTime, Utc};
use prost::Message;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::ledger::{FjallLedger, LedgerError, PruneStats};
use crate::messaging::MessageProducer;
use crate::observability::Metrics;
use crate::proto::TaskMessage;
use crate::report::ValidationReport;
use crate::worker::RunConfig;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Undecodable task message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error(transparent)]
    TaskState(#[from] TaskStateError),
}

impl SchedulerError {
    /// Dead-letter code for deliveries that can never succeed.
    ///
    /// `None` means the failure is environmental (ledger, disk) and the
    /// message should stay pending.
    pub fn dead_letter_code(&self) -> Option<&'static str> {
        match self {
            SchedulerError::Decode(_) => Some("DECODE_ERROR"),
            SchedulerError::TaskNotFound(_) => Some("TASK_NOT_FOUND"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Retention as a chrono duration; absurdly large values saturate to a century.
pub fn retention_window(config: &SchedulerConfig) -> chrono::Duration {
    chrono::Duration::from_std(config.task_retention.as_duration())
        .unwrap_or_else(|_| chrono::Duration::days(36_500))
}

pub struct Scheduler {
    ledger: FjallLedger,
    producer: Arc<dyn MessageProducer>,
    topic: String,
    retention: chrono::Duration,
    metrics: Arc<Metrics>,
}

impl Scheduler {
    pub fn new(
        ledger: FjallLedger,
        producer: Arc<dyn MessageProducer>,
        config: &SchedulerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ledger,
            producer,
            topic: config.topic.clone(),
            retention: retention_window(config),
            metrics,
        }
    }

    pub fn ledger(&self) -> &FjallLedger {
        &self.ledger
    }

    /// Persist a queued task and publish it.
    ///
    /// The task is returned even when publishing fails; in that case it is
    /// already `failed` with the publish error recorded, so the caller can
    /// always poll by id.
    pub async fn schedule_immediate_task(
        &self,
        config: RunConfig,
        requested_by: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<ValidationTask> {
        let mut task = ValidationTask::new(config, requested_by, metadata);
        self.ledger.upsert_task(&task)?;
        self.metrics.task_scheduled();

        let message = TaskMessage {
            task_id: task.id.clone(),
            requested_by: task.requested_by.clone(),
            requested_at_ms: task.requested_at.timestamp_millis().max(0) as u64,
            trace_id: task.metadata.get("trace_id").cloned().unwrap_or_default(),
        };

        match self.producer.publish(&self.topic, message.encode_to_vec()).await {
            Ok(()) => {
                info!(task_id = %task.id, requested_by, topic = %self.topic, "Validation task scheduled");
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to publish validation task");
                task.fail(format!("task-publish-failure: {}", e), Utc::now())?;
                self.ledger.upsert_task(&task)?;
                self.metrics.task_failed();
            }
        }

        Ok(task)
    }

    pub fn get_validation_task(&self, task_id: &str) -> Result<Option<ValidationTask>> {
        Ok(self.ledger.get_task(task_id)?)
    }

    pub fn get_validation_report(&self, report_id: &str) -> Result<Option<ValidationReport>> {
        Ok(self.ledger.get_report(report_id)?)
    }

    /// Newest first
    pub fn list_tasks(&self, limit: usize) -> Result<Vec<ValidationTask>> {
        Ok(self.ledger.list_tasks(limit)?)
    }

    /// Newest first
    pub fn list_reports(&self, limit: usize) -> Result<Vec<ValidationReport>> {
        Ok(self.ledger.list_reports(limit)?)
    }

    /// Remove queued/running tasks older than the retention window.
    pub fn cleanup_expired_tasks(&self, now: DateTime<Utc>) -> Result<PruneStats> {
        let stats = self.ledger.prune_expired(self.retention, now)?;
        if stats.tasks_pruned > 0 {
            info!(pruned = stats.tasks_pruned, "Expired validation tasks removed");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::messaging::MockProducer;
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir, producer: Arc<MockProducer>) -> Scheduler {
        let ledger = FjallLedger::open(dir.path()).unwrap();
        Scheduler::new(ledger, producer, &SchedulerConfig::default(), Arc::new(Metrics::new()))
    }

    fn run_config() -> RunConfig {
        RunConfig::from_config(&Config::default())
    }

    #[tokio::test]
    async fn test_schedule_persists_and_publishes() {
        let temp_dir = TempDir::new().unwrap();
        let producer = Arc::new(MockProducer::new());
        let scheduler = scheduler(&temp_dir, producer.clone());

        let task = scheduler
            .schedule_immediate_task(run_config(), "cli", BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Queued);
        let stored = scheduler.get_validation_task(&task.id).unwrap().unwrap();
        assert_eq!(stored, task);

        let published = producer.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "media-validation");
        let message = TaskMessage::decode(&published[0].1[..]).unwrap();
        assert_eq!(message.task_id, task.id);
        assert_eq!(message.requested_by, "cli");
    }

    #[tokio::test]
    async fn test_publish_failure_marks_task_failed() {
        let temp_dir = TempDir::new().unwrap();
        let scheduler = scheduler(&temp_dir, Arc::new(MockProducer::failing()));

        let task = scheduler
            .schedule_immediate_task(run_config(), "cli", BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().starts_with("task-publish-failure"));

        let stored = scheduler.get_validation_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_stale_unfinished_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let scheduler = scheduler(&temp_dir, Arc::new(MockProducer::new()));

        let queued = scheduler
            .schedule_immediate_task(run_config(), "cli", BTreeMap::new())
            .await
            .unwrap();
        let mut done = ValidationTask::new(run_config(), "cli", BTreeMap::new());
        done.start(Utc::now()).unwrap();
        done.complete("report-x", Utc::now()).unwrap();
        scheduler.ledger().upsert_task(&done).unwrap();

        let stats = scheduler
            .cleanup_expired_tasks(Utc::now() + chrono::Duration::days(8))
            .unwrap();

        assert_eq!(stats.pruned_ids, vec![queued.id.clone()]);
        assert!(scheduler.get_validation_task(&queued.id).unwrap().is_none());
        assert!(scheduler.get_validation_task(&done.id).unwrap().is_some());
    }

    #[test]
    fn test_dead_letter_codes() {
        assert_eq!(
            SchedulerError::TaskNotFound("x".to_string()).dead_letter_code(),
            Some("TASK_NOT_FOUND")
        );
        assert_eq!(
            SchedulerError::Ledger(LedgerError::Io(std::io::Error::other("disk full"))).dead_letter_code(),
            None
        );
    }
}
