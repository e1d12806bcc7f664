/// Retention for task records
use chrono::{DateTime, Duration, Utc};
use fjall::{Keyspace, PartitionHandle};
use tracing::{debug, info, warn};

use super::error::Result;
use super::partitions::{decode_task_key, encode_meta_key};
use crate::scheduler::ValidationTask;

/// Metadata key for pruning state
const META_LAST_PRUNE_TASKS: &str = "last_prune_tasks";

/// Pruning statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub tasks_scanned: usize,
    pub tasks_pruned: usize,
    pub pruned_ids: Vec<String>,
}

/// Remove queued/running tasks requested more than `retention` before `now`.
///
/// Completed and failed tasks are history and stay. Records that fail to
/// decode are skipped, not deleted.
pub fn prune_expired_tasks(
    keyspace: &Keyspace,
    tasks_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();
    let mut expired = Vec::new();

    for item in tasks_partition.iter() {
        let (key, value) = item?;
        stats.tasks_scanned += 1;

        let task: ValidationTask = match serde_json::from_slice(&value) {
            Ok(task) => task,
            Err(e) => {
                warn!(key = ?decode_task_key(&key), error = %e, "Skipping undecodable task record");
                continue;
            }
        };

        if task.is_expired(now, retention) {
            debug!(task_id = %task.id, status = %task.status, "Task expired");
            expired.push((key, task.id));
        }
    }

    if !expired.is_empty() {
        let mut batch = keyspace.batch();
        for (key, _) in &expired {
            batch.remove(tasks_partition, key.clone());
        }
        batch.commit()?;
    }

    stats.tasks_pruned = expired.len();
    stats.pruned_ids = expired.into_iter().map(|(_, id)| id).collect();

    metadata_partition.insert(
        encode_meta_key(META_LAST_PRUNE_TASKS),
        now.to_rfc3339().as_bytes(),
    )?;

    info!(
        scanned = stats.tasks_scanned,
        pruned = stats.tasks_pruned,
        "Task pruning complete"
    );
    Ok(stats)
}

/// When tasks were last pruned, if ever
pub fn last_prune(metadata_partition: &PartitionHandle) -> Result<Option<DateTime<Utc>>> {
    let Some(bytes) = metadata_partition.get(encode_meta_key(META_LAST_PRUNE_TASKS))? else {
        return Ok(None);
    };
    Ok(std::str::from_utf8(&bytes)
        .ok()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc)))
}
