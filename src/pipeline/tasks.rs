//! Task lifecycle over `processing_status`.
//!
//! A task row is created by the initiator before capture starts. The
//! aggregator only ever updates it.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{now_timestamp, DatabaseError};
use crate::models::enums::TaskStatus;
use crate::models::ProcessingStatus;

const TASK_COLUMNS: &str = "task_id, total_guides, processed_guides, retry_guides,
    total_execucoes, status, last_error, started_at, last_update, completed_at";

/// Insert a fresh `processing` task and return it.
pub fn create_task(
    conn: &Connection,
    total_guides: Option<u32>,
) -> Result<ProcessingStatus, DatabaseError> {
    let now = now_timestamp();
    let task = ProcessingStatus {
        task_id: Uuid::new_v4().to_string(),
        total_guides: total_guides.unwrap_or(0),
        processed_guides: 0,
        retry_guides: 0,
        total_execucoes: 0,
        status: TaskStatus::Processing,
        last_error: None,
        started_at: now.clone(),
        last_update: now,
        completed_at: None,
    };

    conn.execute(
        "INSERT INTO processing_status (task_id, total_guides, status, started_at, last_update)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            task.task_id,
            task.total_guides,
            task.status.as_str(),
            task.started_at,
            task.last_update,
        ],
    )?;
    tracing::info!(task_id = %task.task_id, total_guides = task.total_guides, "Task created");
    Ok(task)
}

pub fn get_task(conn: &Connection, task_id: &str) -> Result<Option<ProcessingStatus>, DatabaseError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM processing_status WHERE task_id = ?1");
    let row = conn
        .query_row(&sql, params![task_id], read_task_row)
        .optional()?;
    row.map(task_from_row).transpose()
}

/// Tasks still in `processing` or `waiting_processing`, oldest first.
pub fn list_open_tasks(conn: &Connection) -> Result<Vec<ProcessingStatus>, DatabaseError> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM processing_status
         WHERE status IN ('processing', 'waiting_processing')
         ORDER BY started_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_task_row)?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(task_from_row(row?)?);
    }
    Ok(tasks)
}

pub fn set_status(conn: &Connection, task_id: &str, status: TaskStatus) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE processing_status SET status = ?2, last_update = ?3 WHERE task_id = ?1",
        params![task_id, status.as_str(), now_timestamp()],
    )?;
    ensure_updated(updated, task_id)?;
    tracing::debug!(task_id, status = status.as_str(), "Task status set");
    Ok(())
}

pub fn set_total_guides(conn: &Connection, task_id: &str, total: u32) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE processing_status SET total_guides = ?2, last_update = ?3 WHERE task_id = ?1",
        params![task_id, total, now_timestamp()],
    )?;
    ensure_updated(updated, task_id)
}

/// Total acquisition failure. The task is not retried automatically.
pub fn mark_failed(conn: &Connection, task_id: &str, reason: &str) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE processing_status
         SET status = 'failed', last_error = ?2, last_update = ?3
         WHERE task_id = ?1",
        params![task_id, reason, now_timestamp()],
    )?;
    ensure_updated(updated, task_id)?;
    tracing::error!(task_id, reason, "Task failed");
    Ok(())
}

/// Overwrite the counters and derived status. Returns `false` if the task row is missing.
///
/// An existing `completed_at` is kept while the task stays complete and
/// cleared when `completed_at` is `None`.
pub(crate) fn write_snapshot(
    conn: &Connection,
    task_id: &str,
    processed: u32,
    retry: u32,
    status: TaskStatus,
    completed_at: Option<&str>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE processing_status
         SET processed_guides = ?2, retry_guides = ?3, total_execucoes = ?2,
             status = ?4, last_update = ?5,
             completed_at = CASE WHEN ?6 IS NULL THEN NULL ELSE COALESCE(completed_at, ?6) END
         WHERE task_id = ?1",
        params![task_id, processed, retry, status.as_str(), now_timestamp(), completed_at],
    )?;
    Ok(updated == 1)
}

fn ensure_updated(updated: usize, task_id: &str) -> Result<(), DatabaseError> {
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ProcessingStatus".into(),
            id: task_id.to_string(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct TaskRow {
    task_id: String,
    total_guides: u32,
    processed_guides: u32,
    retry_guides: u32,
    total_execucoes: u32,
    status: String,
    last_error: Option<String>,
    started_at: String,
    last_update: String,
    completed_at: Option<String>,
}

fn read_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        task_id: row.get(0)?,
        total_guides: row.get(1)?,
        processed_guides: row.get(2)?,
        retry_guides: row.get(3)?,
        total_execucoes: row.get(4)?,
        status: row.get(5)?,
        last_error: row.get(6)?,
        started_at: row.get(7)?,
        last_update: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

fn task_from_row(row: TaskRow) -> Result<ProcessingStatus, DatabaseError> {
    Ok(ProcessingStatus {
        task_id: row.task_id,
        total_guides: row.total_guides,
        processed_guides: row.processed_guides,
        retry_guides: row.retry_guides,
        total_execucoes: row.total_execucoes,
        status: TaskStatus::from_str(&row.status)?,
        last_error: row.last_error,
        started_at: row.started_at,
        last_update: row.last_update,
        completed_at: row.completed_at,
    })
}
