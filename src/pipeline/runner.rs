//! Task runner: one capture task end to end.
//!
//! login → listing capture → guide queue → detail capture → staging →
//! `waiting_processing` → reconciliation → status refresh.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;

use super::aggregate;
use super::capture::{AcquisitionError, BrowserDriver, CapturedSession, DateRange, GuideCapture, SessionSource};
use super::classifier::classify;
use super::error::{PipelineError, Stage};
use super::queue::{GuideQueue, QueueError};
use super::reconcile::{ReconcileReport, Reconciler};
use super::staging::{SqliteStagingStore, StagingError, StagingStore};
use super::tasks;
use crate::config::PipelineConfig;
use crate::db::DatabaseError;
use crate::models::enums::TaskStatus;
use crate::models::{NewStagedSession, ProcessingStatus, QueueCounts, QueueItem};

/// What one `run_task` call did.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub guides_captured: u32,
    pub skipped_rows: u32,
    pub queue: QueueCounts,
    pub staging: StagingReport,
    pub reconcile: ReconcileReport,
    pub status: Option<ProcessingStatus>,
}

/// Staging totals for one drained queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StagingReport {
    pub staged: u32,
    pub duplicates: u32,
    pub rejected: u32,
}

pub struct TaskRunner {
    config: PipelineConfig,
    store: Box<dyn StagingStore>,
    queue: GuideQueue,
    reconciler: Reconciler,
}

impl TaskRunner {
    pub fn new(config: PipelineConfig) -> Self {
        let queue = GuideQueue::new(config.max_queue_attempts);
        let reconciler = Reconciler::new(Box::new(SqliteStagingStore::new()), config.reconcile_batch_size);
        Self {
            config,
            store: Box::new(SqliteStagingStore::new()),
            queue,
            reconciler,
        }
    }

    /// Run a task whose `processing_status` row already exists.
    ///
    /// An acquisition failure marks the task `failed`. Row-level problems are
    /// recorded on their rows and never abort the run.
    pub fn run_task<B, S>(
        &self,
        conn: &Connection,
        capture: &mut GuideCapture<B>,
        source: &mut S,
        task_id: &str,
        range: DateRange,
    ) -> Result<TaskReport, PipelineError>
    where
        B: BrowserDriver,
        S: SessionSource + ?Sized,
    {
        let store_err = |stage: Stage| move |e: DatabaseError| PipelineError::store(Some(task_id), stage, e);

        if tasks::get_task(conn, task_id)
            .map_err(store_err(Stage::Capture))?
            .is_none()
        {
            return Err(PipelineError::TaskNotFound(task_id.to_string()));
        }
        tracing::info!(task_id, start = %range.start, end = %range.end, "Task run starting");

        let (guides_captured, skipped_rows) = match self.capture_listing(conn, capture, task_id, range) {
            Ok(counts) => counts,
            Err(CaptureFailure::Acquisition(e)) => return Err(self.fail_task(conn, task_id, e)),
            Err(CaptureFailure::Queue(e)) => return Err(PipelineError::store(Some(task_id), Stage::Capture, e)),
        };

        let staging = self.drain_queue(conn, source, task_id)?;
        let queue = self
            .queue
            .counts(conn, task_id)
            .map_err(|e| PipelineError::store(Some(task_id), Stage::Staging, e))?;

        tasks::set_status(conn, task_id, TaskStatus::WaitingProcessing)
            .map_err(store_err(Stage::Staging))?;

        let reconcile = self.reconciler.reconcile_task(conn, Some(task_id))?;
        let status = aggregate::refresh(conn, self.store.as_ref(), Some(task_id))?;

        tracing::info!(
            task_id,
            guides_captured,
            staged = staging.staged,
            processed = reconcile.processed,
            errors = reconcile.errors,
            "Task run finished"
        );

        Ok(TaskReport {
            task_id: task_id.to_string(),
            guides_captured,
            skipped_rows,
            queue,
            staging,
            reconcile,
            status,
        })
    }

    fn capture_listing<B: BrowserDriver>(
        &self,
        conn: &Connection,
        capture: &mut GuideCapture<B>,
        task_id: &str,
        range: DateRange,
    ) -> Result<(u32, u32), CaptureFailure> {
        capture.login()?;

        let mut guides = HashSet::new();
        let mut pages = capture.capture(range, self.config.max_results);
        for row in pages.by_ref() {
            let row = row?;
            self.queue.enqueue(conn, task_id, &row.numero_guia, &row.data)?;
            guides.insert(row.numero_guia);
        }
        let skipped = pages.skipped_rows() as u32;
        tracing::info!(
            task_id,
            guides = guides.len(),
            pages = pages.pages_loaded(),
            skipped_rows = skipped,
            "Guide listing captured"
        );

        let total = guides.len() as u32;
        tasks::set_total_guides(conn, task_id, total)?;
        Ok((total, skipped))
    }

    /// Fetch and stage the sessions of every queued guide, with bounded retry.
    fn drain_queue<S: SessionSource + ?Sized>(
        &self,
        conn: &Connection,
        source: &mut S,
        task_id: &str,
    ) -> Result<StagingReport, PipelineError> {
        let queue_err = |e: QueueError| PipelineError::store(Some(task_id), Stage::Staging, e);
        let mut report = StagingReport::default();

        while let Some(item) = self.queue.claim_next(conn, task_id).map_err(queue_err)? {
            match source.fetch_sessions(&item) {
                Ok(sessions) => {
                    self.stage_sessions(conn, &item, &sessions, &mut report)?;
                    self.queue.complete(conn, &item.id).map_err(queue_err)?;
                }
                Err(e) => {
                    self.queue.fail(conn, &item.id, &e.to_string()).map_err(queue_err)?;
                }
            }
        }
        Ok(report)
    }

    /// Stage one guide's sessions. Duplicates and invalid sessions are skipped.
    pub fn stage_sessions(
        &self,
        conn: &Connection,
        item: &QueueItem,
        sessions: &[CapturedSession],
        report: &mut StagingReport,
    ) -> Result<(), PipelineError> {
        for (index, captured) in sessions.iter().enumerate() {
            let session = self.to_staged(item, captured, index as u32 + 1);
            match self.store.stage(conn, &session) {
                Ok(_) => report.staged += 1,
                Err(StagingError::Duplicate { codigo_ficha }) => {
                    report.duplicates += 1;
                    tracing::debug!(
                        task_id = %item.task_id,
                        numero_guia = %item.numero_guia,
                        codigo_ficha = %codigo_ficha,
                        "Session already staged, skipping"
                    );
                }
                Err(StagingError::Database(e)) => {
                    return Err(PipelineError::store(Some(&item.task_id), Stage::Staging, e));
                }
                Err(e) => {
                    report.rejected += 1;
                    tracing::warn!(
                        task_id = %item.task_id,
                        numero_guia = %item.numero_guia,
                        error = %e,
                        "Captured session rejected"
                    );
                }
            }
        }
        Ok(())
    }

    fn to_staged(&self, item: &QueueItem, captured: &CapturedSession, ordem: u32) -> NewStagedSession {
        let biometria = classify(&captured.indicator_text, &captured.icon_path);
        NewStagedSession {
            numero_guia: item.numero_guia.clone(),
            data_atendimento_completa: captured.data_atendimento_completa.clone(),
            data_execucao: captured.data_execucao.clone(),
            paciente_nome: captured.paciente_nome.clone(),
            paciente_carteirinha: captured.paciente_carteirinha.clone(),
            codigo_ficha: captured.codigo_ficha.clone(),
            ordem,
            profissional_executante: captured.profissional_executante.clone(),
            credentials: captured.credentials.clone(),
            status_biometria: Some(biometria.status_biometria),
            tipo_biometria: Some(biometria.tipo_biometria),
            origem: self.config.origem.clone(),
            task_id: Some(item.task_id.clone()),
        }
    }

    fn fail_task(&self, conn: &Connection, task_id: &str, e: AcquisitionError) -> PipelineError {
        if let Err(mark) = tasks::mark_failed(conn, task_id, &e.to_string()) {
            tracing::error!(task_id, error = %mark, "Could not mark task as failed");
        }
        PipelineError::Acquisition {
            task_id: task_id.to_string(),
            source: e,
        }
    }
}

enum CaptureFailure {
    Acquisition(AcquisitionError),
    Queue(QueueError),
}

impl From<AcquisitionError> for CaptureFailure {
    fn from(e: AcquisitionError) -> Self {
        Self::Acquisition(e)
    }
}

impl From<QueueError> for CaptureFailure {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

impl From<DatabaseError> for CaptureFailure {
    fn from(e: DatabaseError) -> Self {
        Self::Queue(QueueError::Database(e))
    }
}
