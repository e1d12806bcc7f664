use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::worker::RunConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// `queued -> running -> completed | failed`; a queued task may also
    /// fail directly (publish failure).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskStateError {
    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Persisted record of one requested validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationTask {
    pub id: String,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub config: RunConfig,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationTask {
    /// New queued task. Ids are UUIDv7 so they sort by creation time.
    pub fn new(
        config: RunConfig,
        requested_by: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            requested_by: requested_by.into(),
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: TaskStatus::Queued,
            config,
            metadata,
            report_id: None,
            error: None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TaskStateError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskStateError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), TaskStateError> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    pub fn complete(&mut self, report_id: impl Into<String>, at: DateTime<Utc>) -> Result<(), TaskStateError> {
        self.transition(TaskStatus::Completed)?;
        self.report_id = Some(report_id.into());
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), TaskStateError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(at);
        Ok(())
    }

    /// Never-completed task older than the retention window.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        !self.status.is_terminal() && self.requested_at + retention < now
    }
}
