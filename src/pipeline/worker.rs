//! Background reconciliation worker.
//!
//! Polls the shared database: releases stale claims, reconciles every
//! `pendente` row and refreshes every open task. Runs until shut down.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;

use super::aggregate;
use super::error::{PipelineError, Stage};
use super::reconcile::{ReconcileReport, Reconciler};
use super::staging::{SqliteStagingStore, StagingStore};
use super::tasks::list_open_tasks;
use crate::config::PipelineConfig;
use crate::db::sqlite::open_database;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub released: u32,
    pub reconcile: ReconcileReport,
    pub tasks_refreshed: u32,
}

/// One worker pass over the whole database.
pub fn run_pass(conn: &Connection, config: &PipelineConfig) -> Result<PassReport, PipelineError> {
    let store = SqliteStagingStore::new();

    let stale_after = chrono::Duration::minutes(i64::from(config.stale_after_minutes));
    let released = store
        .release_stale(conn, stale_after)
        .map_err(|e| PipelineError::store(None, Stage::Reconciliation, e))?;

    let reconciler = Reconciler::new(Box::new(store), config.reconcile_batch_size);
    let reconcile = reconciler.reconcile_task(conn, None)?;

    let open = list_open_tasks(conn).map_err(|e| PipelineError::store(None, Stage::Aggregation, e))?;
    let mut tasks_refreshed = 0;
    for task in &open {
        match aggregate::refresh(conn, &store, Some(&task.task_id)) {
            Ok(Some(_)) => tasks_refreshed += 1,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(task_id = %task.task_id, error = %e, "Task refresh failed");
            }
        }
    }

    Ok(PassReport {
        released,
        reconcile,
        tasks_refreshed,
    })
}

/// Handle for the worker thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on `Drop`.
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown. A pass in progress completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Request shutdown and wait for the thread to exit.
    pub fn join(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the worker on its own thread with its own connection to `db_path`.
pub fn start_worker(db_path: PathBuf, config: PipelineConfig) -> WorkerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(
            db = %db_path.display(),
            interval_secs = config.poll_interval_secs,
            "Reconciliation worker started"
        );
        worker_loop(&db_path, &config, &flag);
        tracing::info!("Reconciliation worker shutting down");
    });

    WorkerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn worker_loop(db_path: &Path, config: &PipelineConfig, shutdown: &AtomicBool) {
    let interval = Duration::from_secs(config.poll_interval_secs.max(1));

    while !shutdown.load(Ordering::Relaxed) {
        match open_database(db_path) {
            Ok(conn) => match run_pass(&conn, config) {
                Ok(report) => tracing::debug!(
                    released = report.released,
                    processed = report.reconcile.processed,
                    errors = report.reconcile.errors,
                    tasks_refreshed = report.tasks_refreshed,
                    "Worker pass finished"
                ),
                Err(e) => tracing::error!(
                    task_id = e.task_id(),
                    stage = %e.stage(),
                    error = %e,
                    "Worker pass aborted"
                ),
            },
            Err(e) => tracing::error!(error = %e, "Worker could not open database"),
        }

        let mut waited = Duration::ZERO;
        while waited < interval {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            std::thread::sleep(SLEEP_GRANULARITY);
            waited += SLEEP_GRANULARITY;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_guide, NewGuide};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{StagedStatus, TaskStatus};
    use crate::pipeline::staging::store::tests::make_session;
    use crate::pipeline::tasks::{create_task, get_task};

    #[test]
    fn pass_reconciles_and_refreshes_open_tasks() {
        let conn = open_memory_database().unwrap();
        insert_guide(
            &conn,
            &NewGuide {
                numero_guia: "20240001".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let task = create_task(&conn, Some(1)).unwrap();
        let store = SqliteStagingStore::new();
        store.stage(&conn, &make_session("20240001", 1, &task.task_id)).unwrap();

        let report = run_pass(&conn, &PipelineConfig::default()).unwrap();
        assert_eq!(report.reconcile.processed, 1);
        assert_eq!(report.tasks_refreshed, 1);
        assert_eq!(
            get_task(&conn, &task.task_id).unwrap().unwrap().status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn pass_leaves_task_without_staged_rows_open() {
        let conn = open_memory_database().unwrap();
        let task = create_task(&conn, Some(5)).unwrap();

        run_pass(&conn, &PipelineConfig::default()).unwrap();

        let stored = get_task(&conn, &task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Processing);
        assert!(stored.completed_at.is_none());
        assert!(list_open_tasks(&conn)
            .unwrap()
            .iter()
            .any(|t| t.task_id == task.task_id));
    }

    #[test]
    fn pass_releases_stale_claims_before_reconciling() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        let id = store.stage(&conn, &make_session("55555555", 1, "t")).unwrap();
        store.claim(&conn, &id).unwrap();
        conn.execute(
            "UPDATE sessoes_staging SET updated_at = '2000-01-01T00:00:00Z' WHERE id = ?1",
            [&id],
        )
        .unwrap();

        let report = run_pass(&conn, &PipelineConfig::default()).unwrap();
        assert_eq!(report.released, 1);
        assert_eq!(report.reconcile.errors, 1);
        assert_eq!(store.get(&conn, &id).unwrap().status, StagedStatus::Erro);
    }

    #[test]
    fn worker_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            poll_interval_secs: 3600,
            ..Default::default()
        };
        let handle = start_worker(dir.path().join("guias.db"), config);
        handle.join();
    }

    #[test]
    fn worker_runs_first_pass_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guias.db");
        {
            let conn = open_database(&path).unwrap();
            let store = SqliteStagingStore::new();
            store.stage(&conn, &make_session("55555555", 1, "t")).unwrap();
        }

        let handle = start_worker(path.clone(), PipelineConfig::default());
        let conn = open_database(&path).unwrap();
        let mut done = false;
        for _ in 0..100 {
            let pending = SqliteStagingStore::new().list_pending(&conn, None, 10).unwrap();
            if pending.is_empty() {
                done = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        handle.shutdown();
        drop(handle);
        assert!(done);
    }
}
