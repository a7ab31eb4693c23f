//! Per-task queue of guides awaiting detail capture, with bounded retry.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{now_timestamp, DatabaseError};
use crate::models::enums::QueueStatus;
use crate::models::{QueueCounts, QueueItem};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue item not found: {0}")]
    NotFound(String),

    #[error("Queue item {id} is {status}, expected processing")]
    NotProcessing { id: String, status: QueueStatus },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

const QUEUE_COLUMNS: &str =
    "id, task_id, numero_guia, data_execucao, status, attempts, error, created_at, updated_at";

pub struct GuideQueue {
    max_attempts: u32,
}

impl GuideQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Add a guide to the task's queue. `false` if it was already queued.
    pub fn enqueue(
        &self,
        conn: &Connection,
        task_id: &str,
        numero_guia: &str,
        data_execucao: &str,
    ) -> Result<bool, QueueError> {
        let now = now_timestamp();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO guias_queue
             (id, task_id, numero_guia, data_execucao, status, attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
            params![
                Uuid::new_v4().to_string(),
                task_id,
                numero_guia.trim(),
                data_execucao.trim(),
                now,
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Take the oldest pending item of a task, counting the attempt.
    pub fn claim_next(&self, conn: &Connection, task_id: &str) -> Result<Option<QueueItem>, QueueError> {
        loop {
            let candidate: Option<String> = conn
                .query_row(
                    "SELECT id FROM guias_queue
                     WHERE task_id = ?1 AND status = 'pending'
                     ORDER BY created_at ASC, numero_guia ASC
                     LIMIT 1",
                    params![task_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = candidate else {
                return Ok(None);
            };

            let claimed = conn.execute(
                "UPDATE guias_queue
                 SET status = 'processing', attempts = attempts + 1, updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now_timestamp()],
            )?;
            // Lost the race to another worker; look again.
            if claimed == 1 {
                return self.get(conn, &id).map(Some);
            }
        }
    }

    pub fn complete(&self, conn: &Connection, id: &str) -> Result<(), QueueError> {
        let updated = conn.execute(
            "UPDATE guias_queue SET status = 'done', error = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'processing'",
            params![id, now_timestamp()],
        )?;
        if updated == 0 {
            return Err(self.not_processing(conn, id));
        }
        Ok(())
    }

    /// Record a failed attempt. Returns the item's new status: `pending` while
    /// attempts remain, `error` once they are exhausted.
    pub fn fail(&self, conn: &Connection, id: &str, reason: &str) -> Result<QueueStatus, QueueError> {
        let updated = conn.execute(
            "UPDATE guias_queue
             SET status = CASE WHEN attempts >= ?3 THEN 'error' ELSE 'pending' END,
                 error = ?2, updated_at = ?4
             WHERE id = ?1 AND status = 'processing'",
            params![id, reason, self.max_attempts, now_timestamp()],
        )?;
        if updated == 0 {
            return Err(self.not_processing(conn, id));
        }

        let item = self.get(conn, id)?;
        tracing::warn!(
            task_id = %item.task_id,
            numero_guia = %item.numero_guia,
            attempts = item.attempts,
            status = item.status.as_str(),
            reason,
            "Guide detail capture failed"
        );
        Ok(item.status)
    }

    pub fn get(&self, conn: &Connection, id: &str) -> Result<QueueItem, QueueError> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM guias_queue WHERE id = ?1");
        let row = conn
            .query_row(&sql, params![id], read_queue_row)
            .optional()?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        Ok(queue_item_from_row(row)?)
    }

    pub fn counts(&self, conn: &Connection, task_id: &str) -> Result<QueueCounts, QueueError> {
        queue_counts(conn, task_id)
    }

    fn not_processing(&self, conn: &Connection, id: &str) -> QueueError {
        match self.get(conn, id) {
            Ok(item) => QueueError::NotProcessing {
                id: id.to_string(),
                status: item.status,
            },
            Err(e) => e,
        }
    }
}

/// Per-status totals of a task's queue.
pub fn queue_counts(conn: &Connection, task_id: &str) -> Result<QueueCounts, QueueError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM guias_queue WHERE task_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![task_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;

    let mut counts = QueueCounts::default();
    for row in rows {
        let (status, count) = row?;
        match QueueStatus::from_str(&status)? {
            QueueStatus::Pending => counts.pending = count,
            QueueStatus::Processing => counts.processing = count,
            QueueStatus::Done => counts.done = count,
            QueueStatus::Error => counts.error = count,
        }
    }
    Ok(counts)
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct QueueRow {
    id: String,
    task_id: String,
    numero_guia: String,
    data_execucao: String,
    status: String,
    attempts: u32,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_queue_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueRow> {
    Ok(QueueRow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        numero_guia: row.get(2)?,
        data_execucao: row.get(3)?,
        status: row.get(4)?,
        attempts: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn queue_item_from_row(row: QueueRow) -> Result<QueueItem, DatabaseError> {
    Ok(QueueItem {
        id: row.id,
        task_id: row.task_id,
        numero_guia: row.numero_guia,
        data_execucao: row.data_execucao,
        status: QueueStatus::from_str(&row.status)?,
        attempts: row.attempts,
        error: row.error,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
