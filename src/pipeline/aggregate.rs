//! Task aggregator: recomputes a task's snapshot from its staged rows and
//! its guide queue.

use rusqlite::Connection;

use super::error::{PipelineError, Stage};
use super::queue::queue_counts;
use super::staging::StagingStore;
use super::tasks::{get_task, mark_failed, write_snapshot};
use crate::db::{now_timestamp, DatabaseError};
use crate::models::enums::TaskStatus;
use crate::models::{ProcessingStatus, QueueCounts, StagingStats};

/// Status implied by the counts, and whether the task is complete.
///
/// Rows still claimed (`processando`) and guides still queued count as
/// pending. Guides whose detail capture was given up on count as errors; if
/// they are the only outcome the task is `failed`.
pub fn derive_status(stats: &StagingStats, queue: &QueueCounts) -> (TaskStatus, bool) {
    if stats.unfinished() + queue.unfinished() > 0 {
        return (TaskStatus::Processing, false);
    }
    match (stats.erro + queue.error, stats.total()) {
        (0, _) => (TaskStatus::Completed, true),
        (_, 0) => (TaskStatus::Failed, false),
        _ => (TaskStatus::CompletedWithErrors, true),
    }
}

/// Recompute and persist the snapshot for `task_id`.
///
/// Returns `None` without writing when no task id is given or the task row
/// does not exist. A task with nothing staged keeps its status while it is
/// still `processing` (capture running) or already `failed`.
pub fn refresh(
    conn: &Connection,
    store: &dyn StagingStore,
    task_id: Option<&str>,
) -> Result<Option<ProcessingStatus>, PipelineError> {
    let Some(task_id) = task_id.filter(|id| !id.trim().is_empty()) else {
        tracing::info!("No task id given, skipping status refresh");
        return Ok(None);
    };

    let store_err = |e: DatabaseError| PipelineError::store(Some(task_id), Stage::Aggregation, e);

    let Some(current) = get_task(conn, task_id).map_err(store_err)? else {
        tracing::warn!(task_id, "Task row not found, status not refreshed");
        return Ok(None);
    };

    let stats = store
        .stats(conn, task_id)
        .map_err(|e| PipelineError::store(Some(task_id), Stage::Aggregation, e))?;
    let queue = queue_counts(conn, task_id)
        .map_err(|e| PipelineError::store(Some(task_id), Stage::Aggregation, e))?;

    if stats.total() == 0 {
        match current.status {
            TaskStatus::Failed => {
                tracing::debug!(task_id, "Failed task has no staged rows, keeping status");
                return Ok(Some(current));
            }
            TaskStatus::Processing => {
                tracing::debug!(task_id, "Capture still running, nothing staged yet");
                return Ok(Some(current));
            }
            _ => {}
        }
    }

    let (status, complete) = derive_status(&stats, &queue);
    let retry = stats.erro + queue.error;
    let completed_at = complete.then(now_timestamp);
    write_snapshot(conn, task_id, stats.processado, retry, status, completed_at.as_deref())
        .map_err(store_err)?;

    if status == TaskStatus::Failed {
        let reason = format!(
            "Detail capture failed for {} guide(s), nothing staged",
            queue.error
        );
        mark_failed(conn, task_id, &reason).map_err(store_err)?;
    }

    tracing::info!(
        task_id,
        processado = stats.processado,
        erro = stats.erro,
        pendente = stats.unfinished(),
        queue_error = queue.error,
        status = status.as_str(),
        "Task status refreshed"
    );

    get_task(conn, task_id).map_err(store_err)
}
