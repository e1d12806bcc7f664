use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::report::ValidationReport;
use crate::scheduler::ValidationTask;

use super::error::Result;
use super::partitions::{encode_report_key, encode_task_key};
use super::pruning::{PruneStats, last_prune, prune_expired_tasks};

/// Fjall-backed persistent storage for validation tasks and reports
///
/// The persisted task record is the only source of truth for task state.
#[derive(Clone)]
pub struct FjallLedger {
    keyspace: Keyspace,
    tasks: PartitionHandle,
    reports: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let tasks = keyspace.open_partition("tasks", PartitionCreateOptions::default())?;
        let reports = keyspace.open_partition("reports", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            tasks,
            reports,
            metadata,
        })
    }

    /// Store or update a task record
    pub fn upsert_task(&self, task: &ValidationTask) -> Result<()> {
        let value = serde_json::to_vec(task)?;
        self.tasks.insert(encode_task_key(&task.id), value)?;
        debug!(task_id = %task.id, status = %task.status, "Upserted task");
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<ValidationTask>> {
        match self.tasks.get(encode_task_key(task_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Newest first
    pub fn list_tasks(&self, limit: usize) -> Result<Vec<ValidationTask>> {
        let mut tasks = Vec::new();
        for item in self.tasks.iter().rev().take(limit) {
            let (_, value) = item?;
            tasks.push(serde_json::from_slice(&value)?);
        }
        Ok(tasks)
    }

    pub fn put_report(&self, report: &ValidationReport) -> Result<()> {
        let value = serde_json::to_vec(report)?;
        self.reports.insert(encode_report_key(&report.id), value)?;
        debug!(report_id = %report.id, "Stored report");
        Ok(())
    }

    pub fn get_report(&self, report_id: &str) -> Result<Option<ValidationReport>> {
        match self.reports.get(encode_report_key(report_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Newest first
    pub fn list_reports(&self, limit: usize) -> Result<Vec<ValidationReport>> {
        let mut reports = Vec::new();
        for item in self.reports.iter().rev().take(limit) {
            let (_, value) = item?;
            reports.push(serde_json::from_slice(&value)?);
        }
        Ok(reports)
    }

    /// Remove never-completed tasks older than `retention`
    pub fn prune_expired(&self, retention: Duration, now: DateTime<Utc>) -> Result<PruneStats> {
        prune_expired_tasks(&self.keyspace, &self.tasks, &self.metadata, retention, now)
    }

    pub fn last_prune(&self) -> Result<Option<DateTime<Utc>>> {
        last_prune(&self.metadata)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<LedgerStats> {
        let mut task_count = 0;
        let mut report_count = 0;

        for item in self.tasks.iter() {
            item?;
            task_count += 1;
        }

        for item in self.reports.iter() {
            item?;
            report_count += 1;
        }

        Ok(LedgerStats {
            task_count,
            report_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub task_count: usize,
    pub report_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config as AppConfig;
    use crate::report::ReportBuilder;
    use crate::worker::RunConfig;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_ledger() -> (FjallLedger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = FjallLedger::open(temp_dir.path().join("test_ledger")).unwrap();
        (ledger, temp_dir)
    }

    fn create_test_task() -> ValidationTask {
        ValidationTask::new(
            RunConfig::from_config(&AppConfig::default()),
            "test",
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_upsert_and_get_task() {
        let (ledger, _temp) = create_test_ledger();
        let task = create_test_task();

        ledger.upsert_task(&task).unwrap();
        let retrieved = ledger.get_task(&task.id).unwrap().unwrap();

        assert_eq!(retrieved, task);
    }

    #[test]
    fn test_get_nonexistent_task() {
        let (ledger, _temp) = create_test_ledger();
        assert!(ledger.get_task("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_list_tasks_newest_first() {
        let (ledger, _temp) = create_test_ledger();
        let ids: Vec<String> = (0..3)
            .map(|_| {
                let task = create_test_task();
                ledger.upsert_task(&task).unwrap();
                task.id
            })
            .collect();

        let listed: Vec<String> = ledger
            .list_tasks(2)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(listed, vec![ids[2].clone(), ids[1].clone()]);
    }

    #[test]
    fn test_reports_roundtrip() {
        let (ledger, _temp) = create_test_ledger();
        let start = Utc::now();
        let report = ReportBuilder::new(start, 10).build(start);

        ledger.put_report(&report).unwrap();
        let stored = ledger.get_report(&report.id).unwrap().unwrap();
        assert_eq!(stored.id, report.id);
        assert_eq!(ledger.list_reports(10).unwrap().len(), 1);
    }

    #[test]
    fn test_runs_started_together_keep_both_reports() {
        let (ledger, _temp) = create_test_ledger();
        let start = Utc::now();
        let first = ReportBuilder::new(start, 10).build(start);
        let second = ReportBuilder::new(start, 10).build(start);
        assert_ne!(first.id, second.id);

        ledger.put_report(&first).unwrap();
        ledger.put_report(&second).unwrap();

        assert!(ledger.get_report(&first.id).unwrap().is_some());
        assert!(ledger.get_report(&second.id).unwrap().is_some());
        assert_eq!(ledger.list_reports(10).unwrap().len(), 2);
    }

    #[test]
    fn test_prune_removes_only_stale_unfinished_tasks() {
        let (ledger, _temp) = create_test_ledger();
        let now = Utc::now();

        let mut stale_queued = create_test_task();
        stale_queued.requested_at = now - Duration::days(10);

        let mut stale_running = create_test_task();
        stale_running.requested_at = now - Duration::days(10);
        stale_running.start(now - Duration::days(10)).unwrap();

        let mut stale_done = create_test_task();
        stale_done.requested_at = now - Duration::days(10);
        stale_done.start(now).unwrap();
        stale_done.complete("r", now).unwrap();

        let fresh = create_test_task();

        for task in [&stale_queued, &stale_running, &stale_done, &fresh] {
            ledger.upsert_task(task).unwrap();
        }

        let stats = ledger.prune_expired(Duration::days(7), now).unwrap();

        assert_eq!(stats.tasks_scanned, 4);
        assert_eq!(stats.tasks_pruned, 2);
        assert!(ledger.get_task(&stale_queued.id).unwrap().is_none());
        assert!(ledger.get_task(&stale_running.id).unwrap().is_none());
        assert!(ledger.get_task(&stale_done.id).unwrap().is_some());
        assert!(ledger.get_task(&fresh.id).unwrap().is_some());
        assert!(ledger.last_prune().unwrap().is_some());
    }

    #[test]
    fn test_stats() {
        let (ledger, _temp) = create_test_ledger();
        ledger.upsert_task(&create_test_task()).unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.task_count, 1);
        assert_eq!(stats.report_count, 0);
    }

    #[test]
    fn test_persist() {
        let (ledger, _temp) = create_test_ledger();
        ledger.upsert_task(&create_test_task()).unwrap();
        ledger.persist().unwrap();
    }
}
