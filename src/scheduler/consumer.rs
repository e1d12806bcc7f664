use chrono::Utc;
use prost::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{Result, SchedulerError, TaskStatus};
use crate::ledger::FjallLedger;
use crate::proto::TaskMessage;
use crate::queue::{FjallQueue, MessageEnvelope};
use crate::worker::{BatchWorker, StopSignal};

/// What a delivery did to its task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Completed { task_id: String, report_id: String },
    Failed { task_id: String, error: String },
    /// Redelivery of a task that already reached a terminal state
    Skipped { task_id: String, status: TaskStatus },
}

/// Consumer side of the task topic
///
/// Each delivered message names a task; the consumer moves it to `running`,
/// runs the batch worker with the task's config snapshot, stores the report
/// and finishes the task. Messages are acknowledged once the task record
/// reflects the outcome.
pub struct TaskConsumer {
    ledger: FjallLedger,
    worker: Arc<BatchWorker>,
    queue: Arc<FjallQueue>,
    stop: StopSignal,
}

impl TaskConsumer {
    pub fn new(
        ledger: FjallLedger,
        worker: Arc<BatchWorker>,
        queue: Arc<FjallQueue>,
        stop: StopSignal,
    ) -> Self {
        Self {
            ledger,
            worker,
            queue,
            stop,
        }
    }

    /// Handle one payload from the task topic.
    pub async fn on_message(&self, payload: &[u8]) -> Result<Delivery> {
        let message = TaskMessage::decode(payload)?;
        let task_id = message.task_id;

        let mut task = self
            .ledger
            .get_task(&task_id)?
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;

        match task.status {
            TaskStatus::Queued => {}
            TaskStatus::Running => {
                // A previous process died mid-run.
                warn!(task_id = %task_id, "Task was left running, marking failed");
                let error = "task-execution-failure: interrupted before completion".to_string();
                task.fail(error.clone(), Utc::now())?;
                self.ledger.upsert_task(&task)?;
                self.worker.metrics().task_failed();
                return Ok(Delivery::Failed { task_id, error });
            }
            status => {
                info!(task_id = %task_id, %status, "Task already finished, skipping redelivery");
                return Ok(Delivery::Skipped { task_id, status });
            }
        }

        task.start(Utc::now())?;
        self.ledger.upsert_task(&task)?;
        info!(task_id = %task_id, requested_by = %task.requested_by, "Validation task running");

        let outcome = self.worker.run(&task.config, None, &self.stop).await;
        let report_id = outcome.report.id.clone();

        let stored = self.ledger.put_report(&outcome.report);
        let now = Utc::now();
        let delivery = match stored {
            Ok(()) if !outcome.stopped => {
                task.complete(report_id.clone(), now)?;
                self.worker.metrics().task_completed();
                info!(task_id = %task_id, report_id = %report_id, "Validation task completed");
                Delivery::Completed {
                    task_id: task_id.clone(),
                    report_id,
                }
            }
            Ok(()) => {
                let error = "task-execution-failure: stopped before completion".to_string();
                task.report_id = Some(report_id);
                task.fail(error.clone(), now)?;
                self.worker.metrics().task_failed();
                warn!(task_id = %task_id, "Validation task stopped, partial report kept");
                Delivery::Failed {
                    task_id: task_id.clone(),
                    error,
                }
            }
            Err(e) => {
                let error = format!("task-execution-failure: {}", e);
                task.fail(error.clone(), now)?;
                self.worker.metrics().task_failed();
                error!(task_id = %task_id, error = %e, "Failed to store validation report");
                Delivery::Failed {
                    task_id: task_id.clone(),
                    error,
                }
            }
        };

        self.ledger.upsert_task(&task)?;
        Ok(delivery)
    }

    /// Deliver one envelope, then acknowledge or dead-letter it.
    pub async fn handle(&self, envelope: MessageEnvelope) {
        let seq = envelope.seq;

        match self.on_message(&envelope.message.payload).await {
            Ok(delivery) => {
                if let Err(e) = self.queue.ack(seq) {
                    error!(seq, error = %e, "Failed to acknowledge message");
                }
                info!(seq, ?delivery, "Message handled");
            }
            Err(e) => match e.dead_letter_code() {
                Some(code) => {
                    warn!(seq, code, error = %e, "Undeliverable message");
                    if let Err(dlq_err) = self.queue.move_to_dlq(seq, code, &e.to_string()) {
                        error!(seq, error = %dlq_err, "Failed to move message to DLQ");
                    }
                }
                None => {
                    error!(seq, error = %e, "Message handling failed, leaving it pending");
                }
            },
        }
    }

    /// Consume until the channel closes or the stop signal is raised.
    ///
    /// Messages not yet received when stopping stay pending in the queue.
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<MessageEnvelope>) {
        info!("Task consumer started");

        loop {
            let envelope = tokio::select! {
                _ = self.stop.stopped() => break,
                envelope = receiver.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.handle(envelope).await;
        }

        info!("Task consumer stopped");
    }
}
