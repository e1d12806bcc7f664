/// Fjall-based persistence for validation tasks and reports
///
/// Stores:
///
/// - Task records (status, timestamps, config snapshot, report linkage)
/// - Validation reports, one per completed run
/// - Metadata (pruning state)
///
/// ## Retention
///
/// Queued or running tasks older than `scheduler.task_retention` are
/// removed by `FjallLedger::prune_expired()`; completed and failed tasks
/// and all reports are kept.
///
/// ## Usage
///
/// ```rust,ignore
/// use mediasweep::ledger::FjallLedger;
///
/// let ledger = FjallLedger::open("data/ledger")?;
/// ledger.upsert_task(&task)?;
/// let task = ledger.get_task(&task.id)?;
/// ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::{FjallLedger, LedgerStats};
