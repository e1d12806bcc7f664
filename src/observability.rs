//! Tracing setup and in-process counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    documents_scanned: AtomicU64,
    fields_checked: AtomicU64,
    fields_invalid: AtomicU64,
    fixes_applied: AtomicU64,
    collections_failed: AtomicU64,
    tasks_scheduled: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_scanned(&self, fields: usize, invalid: usize) {
        self.documents_scanned.fetch_add(1, Ordering::Relaxed);
        self.fields_checked.fetch_add(fields as u64, Ordering::Relaxed);
        self.fields_invalid.fetch_add(invalid as u64, Ordering::Relaxed);
    }

    pub fn fixes_applied(&self, count: usize) {
        self.fixes_applied.fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(counter = "fixes_applied", count, "Metric incremented");
    }

    pub fn collection_failed(&self) {
        self.collections_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "collections_failed", "Metric incremented");
    }

    pub fn task_scheduled(&self) {
        self.tasks_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_scheduled", "Metric incremented");
    }

    pub fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_completed", "Metric incremented");
    }

    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_scanned: self.documents_scanned.load(Ordering::Relaxed),
            fields_checked: self.fields_checked.load(Ordering::Relaxed),
            fields_invalid: self.fields_invalid.load(Ordering::Relaxed),
            fixes_applied: self.fixes_applied.load(Ordering::Relaxed),
            collections_failed: self.collections_failed.load(Ordering::Relaxed),
            tasks_scheduled: self.tasks_scheduled.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub documents_scanned: u64,
    pub fields_checked: u64,
    pub fields_invalid: u64,
    pub fixes_applied: u64,
    pub collections_failed: u64,
    pub tasks_scheduled: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.document_scanned(4, 1);
        metrics.document_scanned(2, 0);
        metrics.fixes_applied(3);
        metrics.task_scheduled();
        metrics.task_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_scanned, 2);
        assert_eq!(snapshot.fields_checked, 6);
        assert_eq!(snapshot.fields_invalid, 1);
        assert_eq!(snapshot.fixes_applied, 3);
        assert_eq!(snapshot.tasks_scheduled, 1);
        assert_eq!(snapshot.tasks_failed, 1);
        assert_eq!(snapshot.tasks_completed, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(Metrics::new().snapshot()).unwrap();
        assert_eq!(json["documents_scanned"], 0);
    }
}
