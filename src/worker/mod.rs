//! Batch worker
//!
//! Drives one validation run across the configured collections: paginated
//! reads, page-level validation, optional repairs committed in bounded
//! write batches, and a progress stream for whoever is watching.

mod batch;

pub use batch::BatchWorker;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};

use crate::config::{CollectionConfig, Config, WorkerConfig};
use crate::document::DocumentValidationResult;
use crate::repair::FixResult;
use crate::report::ValidationReport;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to read collection {collection}: {source}")]
    CollectionRead {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to commit repairs to {collection}: {source}")]
    WriteCommit {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Settings a run executes with; stored on the task as its config snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub collections: BTreeMap<String, CollectionConfig>,
    pub worker: WorkerConfig,
    /// Write repairs back to fixable collections
    #[serde(default = "default_apply_fixes")]
    pub apply_fixes: bool,
}

fn default_apply_fixes() -> bool {
    true
}

impl RunConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collections: config.collections.clone(),
            worker: config.worker.clone(),
            apply_fixes: true,
        }
    }

    /// Document cap for one collection.
    pub fn cap_for(&self, collection: &CollectionConfig) -> usize {
        collection
            .max_documents
            .unwrap_or(self.worker.max_documents_per_collection)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub collection: String,
    pub processed: usize,
    pub total: usize,
    pub completed_collections: usize,
    pub total_collections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RunEvent {
    Progress(Progress),
    CollectionFailed { collection: String, error: String },
}

pub type EventSender = mpsc::UnboundedSender<RunEvent>;

/// Cooperative cancellation flag, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: ValidationReport,
    /// The stop signal cut the run short
    pub stopped: bool,
}

/// Result of fixing one document on demand
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFix {
    pub validation: DocumentValidationResult,
    pub fixes: Vec<FixResult>,
    /// Repairs were written back
    pub committed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_prefers_collection_override() {
        let run = RunConfig {
            collections: BTreeMap::new(),
            worker: WorkerConfig {
                max_documents_per_collection: 100,
                ..WorkerConfig::default()
            },
            apply_fixes: true,
        };

        assert_eq!(run.cap_for(&CollectionConfig::default()), 100);
        assert_eq!(
            run.cap_for(&CollectionConfig {
                fixable: false,
                max_documents: Some(7),
            }),
            7
        );
    }

    #[test]
    fn test_run_config_snapshot_roundtrips() {
        let mut config = Config::default();
        config.collections.insert(
            "yachts".to_string(),
            CollectionConfig {
                fixable: true,
                max_documents: None,
            },
        );

        let snapshot = RunConfig::from_config(&config);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let signal = StopSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_stopped());
        signal.stop();
        assert!(observer.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_wakes_waiters() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.stopped().await })
        };

        tokio::task::yield_now().await;
        signal.stop();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already stopped: returns immediately.
        signal.stopped().await;
    }
}
