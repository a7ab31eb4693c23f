use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::ReconciliationError;
use crate::db::repository::{find_guide_by_numero, insert_execution};
use crate::db::now_timestamp;
use crate::models::{ExecutionRecord, Guide, StagedSession};
use crate::pipeline::error::{PipelineError, Stage};
use crate::pipeline::staging::{permanent_code, StagingStore};

/// What happened to a single staged row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Execution created (or already present) and the row is `processado`.
    Processed { execution_id: String, codigo_ficha: String },
    /// Row moved to `erro` with the given reason.
    Failed { reason: String },
    /// Another worker claimed the row first.
    Skipped,
}

/// Totals for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub processed: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl ReconcileReport {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Processed { .. } => self.processed += 1,
            ReconcileOutcome::Failed { .. } => self.errors += 1,
            ReconcileOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Promotes staged sessions into the execution ledger.
pub struct Reconciler {
    store: Box<dyn StagingStore>,
    batch_size: u32,
}

impl Reconciler {
    pub fn new(store: Box<dyn StagingStore>, batch_size: u32) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Drain every `pendente` row, optionally restricted to one task.
    ///
    /// Only a failure to read the staging table is fatal. Already `processado`
    /// rows are never listed, so a pass can be repeated at any time.
    pub fn reconcile_task(
        &self,
        conn: &Connection,
        task_id: Option<&str>,
    ) -> Result<ReconcileReport, PipelineError> {
        let mut report = ReconcileReport::default();
        let mut seen = HashSet::new();

        loop {
            let batch = self
                .store
                .list_pending(conn, task_id, self.batch_size)
                .map_err(|e| PipelineError::store(task_id, Stage::Reconciliation, e))?;

            // A row still listed after its attempt could not even be marked `erro`.
            let fresh: Vec<&StagedSession> =
                batch.iter().filter(|s| seen.insert(s.id.clone())).collect();
            if fresh.is_empty() {
                break;
            }

            for staged in fresh {
                let outcome = self.reconcile_one(conn, staged);
                report.record(&outcome);
            }
        }

        tracing::info!(
            task_id = task_id.unwrap_or(PipelineError::ALL_TASKS),
            processed = report.processed,
            errors = report.errors,
            skipped = report.skipped,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// Claim, then promote or fail a single staged row. Never returns an error.
    pub fn reconcile_one(&self, conn: &Connection, staged: &StagedSession) -> ReconcileOutcome {
        match self.store.claim(conn, &staged.id) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(staged_id = %staged.id, "Row already claimed, skipping");
                return ReconcileOutcome::Skipped;
            }
            Err(e) => return self.fail(conn, staged, &e.to_string()),
        }

        match self.promote(conn, staged) {
            Ok(outcome) => outcome,
            Err(e) => self.fail(conn, staged, &e.to_string()),
        }
    }

    fn promote(
        &self,
        conn: &Connection,
        staged: &StagedSession,
    ) -> Result<ReconcileOutcome, ReconciliationError> {
        let numero_guia = staged.numero_guia.trim();
        if numero_guia.is_empty() {
            return Err(ReconciliationError::MalformedRow(format!(
                "staged row {} has no numero_guia",
                staged.id
            )));
        }

        let guide = find_guide_by_numero(conn, numero_guia)?.ok_or_else(|| {
            ReconciliationError::GuideNotFound {
                numero_guia: numero_guia.to_string(),
            }
        })?;

        let codigo_ficha = if staged.codigo_ficha_temp {
            permanent_code()
        } else {
            staged.codigo_ficha.clone()
        };
        let record = execution_from_staged(staged, &guide, &codigo_ficha);

        let tx = conn.unchecked_transaction()?;
        let inserted = insert_execution(&tx, &record)?;
        if staged.codigo_ficha_temp && inserted {
            self.store.mark_promoted(&tx, &staged.id, &codigo_ficha)?;
        } else {
            self.store.mark_processed(&tx, &staged.id)?;
        }
        tx.commit()?;

        if !inserted {
            tracing::warn!(
                staged_id = %staged.id,
                numero_guia,
                "Execution already existed for staged row, marked processed"
            );
        } else {
            tracing::info!(
                staged_id = %staged.id,
                numero_guia,
                codigo_ficha = %codigo_ficha,
                "Staged session promoted"
            );
        }

        Ok(ReconcileOutcome::Processed {
            execution_id: record.id,
            codigo_ficha,
        })
    }

    fn fail(&self, conn: &Connection, staged: &StagedSession, reason: &str) -> ReconcileOutcome {
        tracing::warn!(
            staged_id = %staged.id,
            numero_guia = %staged.numero_guia,
            task_id = ?staged.task_id,
            reason,
            "Staged session failed reconciliation"
        );
        if let Err(e) = self.store.mark_error(conn, &staged.id, reason) {
            tracing::error!(
                staged_id = %staged.id,
                error = %e,
                "Could not record reconciliation error on staged row"
            );
        }
        ReconcileOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

fn execution_from_staged(staged: &StagedSession, guide: &Guide, codigo_ficha: &str) -> ExecutionRecord {
    ExecutionRecord {
        id: Uuid::new_v4().to_string(),
        guia_id: guide.id.clone(),
        staged_session_id: staged.id.clone(),
        numero_guia: guide.numero_guia.clone(),
        codigo_ficha: codigo_ficha.to_string(),
        data_execucao: staged.data_execucao.clone(),
        data_atendimento_completa: staged.data_atendimento_completa.clone(),
        paciente_nome: staged
            .paciente_nome
            .clone()
            .or_else(|| guide.paciente_nome.clone()),
        paciente_carteirinha: staged
            .paciente_carteirinha
            .clone()
            .or_else(|| guide.paciente_carteirinha.clone()),
        profissional_executante: staged.profissional_executante.clone(),
        credentials: staged.credentials.clone(),
        status_biometria: staged.status_biometria,
        tipo_biometria: staged.tipo_biometria,
        origem: staged.origem.clone(),
        created_at: now_timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{
        count_executions_for_staged, insert_guide, list_executions_for_guide, NewGuide,
    };
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::StagedStatus;
    use crate::pipeline::reconcile::GUIDE_NOT_FOUND;
    use crate::pipeline::staging::store::tests::make_session;
    use crate::pipeline::staging::{SqliteStagingStore, StagingError};

    fn reconciler() -> Reconciler {
        Reconciler::new(Box::new(SqliteStagingStore::new()), 100)
    }

    fn guide(conn: &Connection, numero: &str) -> Guide {
        insert_guide(
            conn,
            &NewGuide {
                numero_guia: numero.into(),
                paciente_nome: Some("Maria Souza".into()),
                quantidade_autorizada: Some(10),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn promotes_row_with_known_guide() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        let g = guide(&conn, "20240001");
        let id = store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();

        let report = reconciler().reconcile_task(&conn, Some("task-1")).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors, 0);

        let staged = store.get(&conn, &id).unwrap();
        assert_eq!(staged.status, StagedStatus::Processado);
        assert!(!staged.codigo_ficha_temp);
        assert!(staged.codigo_ficha.starts_with("FICHA-"));

        let execs = list_executions_for_guide(&conn, &g.id).unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].codigo_ficha, staged.codigo_ficha);
        assert_eq!(execs[0].credentials.codigo_cbo.as_deref(), Some("223605"));
    }

    #[test]
    fn unknown_guide_marks_row_error() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        let id = store.stage(&conn, &make_session("99999999", 1, "task-1")).unwrap();

        let report = reconciler().reconcile_task(&conn, Some("task-1")).unwrap();
        assert_eq!(report.errors, 1);

        let staged = store.get(&conn, &id).unwrap();
        assert_eq!(staged.status, StagedStatus::Erro);
        assert_eq!(staged.error.as_deref(), Some(GUIDE_NOT_FOUND));
        assert_eq!(count_executions_for_staged(&conn, &id).unwrap(), 0);
    }

    #[test]
    fn running_twice_creates_exactly_one_execution() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        guide(&conn, "20240001");
        let id = store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();

        let engine = reconciler();
        engine.reconcile_task(&conn, Some("task-1")).unwrap();
        let second = engine.reconcile_task(&conn, Some("task-1")).unwrap();

        assert_eq!(second, ReconcileReport::default());
        assert_eq!(count_executions_for_staged(&conn, &id).unwrap(), 1);
    }

    #[test]
    fn recapture_after_promotion_is_a_duplicate() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        let g = guide(&conn, "20240001");
        store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();
        reconciler().reconcile_task(&conn, Some("task-1")).unwrap();

        let again = store.stage(&conn, &make_session("20240001", 1, "task-2"));
        assert!(matches!(again, Err(StagingError::Duplicate { .. })));

        let report = reconciler().reconcile_task(&conn, None).unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(list_executions_for_guide(&conn, &g.id).unwrap().len(), 1);
    }

    #[test]
    fn reconcile_one_on_processed_row_is_skipped() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        guide(&conn, "20240001");
        let id = store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();
        let staged = store.get(&conn, &id).unwrap();

        let engine = reconciler();
        assert!(matches!(
            engine.reconcile_one(&conn, &staged),
            ReconcileOutcome::Processed { .. }
        ));
        // Stale snapshot of the same row, as a second worker would hold.
        assert_eq!(engine.reconcile_one(&conn, &staged), ReconcileOutcome::Skipped);
        assert_eq!(count_executions_for_staged(&conn, &id).unwrap(), 1);
    }

    #[test]
    fn row_claimed_elsewhere_is_left_alone() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        guide(&conn, "20240001");
        let id = store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();
        let staged = store.get(&conn, &id).unwrap();
        assert!(store.claim(&conn, &id).unwrap());

        assert_eq!(reconciler().reconcile_one(&conn, &staged), ReconcileOutcome::Skipped);
        assert_eq!(store.get(&conn, &id).unwrap().status, StagedStatus::Processando);
        assert_eq!(count_executions_for_staged(&conn, &id).unwrap(), 0);
    }

    #[test]
    fn one_bad_row_does_not_block_siblings() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        guide(&conn, "20240001");
        let good_a = store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();
        let bad = store.stage(&conn, &make_session("30300303", 1, "task-1")).unwrap();
        let good_b = store.stage(&conn, &make_session("20240001", 2, "task-1")).unwrap();

        let report = reconciler().reconcile_task(&conn, Some("task-1")).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 1);

        assert_eq!(store.get(&conn, &good_a).unwrap().status, StagedStatus::Processado);
        assert_eq!(store.get(&conn, &bad).unwrap().status, StagedStatus::Erro);
        assert_eq!(store.get(&conn, &good_b).unwrap().status, StagedStatus::Processado);
    }

    #[test]
    fn duplicate_permanent_code_becomes_row_error() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        guide(&conn, "20240001");

        let mut first = make_session("20240001", 1, "task-1");
        first.codigo_ficha = Some("FC-1".into());
        store.stage(&conn, &first).unwrap();
        reconciler().reconcile_task(&conn, Some("task-1")).unwrap();

        // Same permanent code can't be staged twice, so force the collision
        // through the ledger side instead.
        let mut second = make_session("20240001", 2, "task-1");
        second.codigo_ficha = Some("FC-2".into());
        let id = store.stage(&conn, &second).unwrap();
        conn.execute(
            "UPDATE execucoes SET codigo_ficha = 'FC-2' WHERE codigo_ficha = 'FC-1'",
            [],
        )
        .unwrap();

        let report = reconciler().reconcile_task(&conn, Some("task-1")).unwrap();
        assert_eq!(report.errors, 1);
        let staged = store.get(&conn, &id).unwrap();
        assert_eq!(staged.status, StagedStatus::Erro);
        assert!(staged.error.is_some());
    }

    #[test]
    fn reconcile_without_task_drains_everything() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStagingStore::new();
        guide(&conn, "20240001");
        store.stage(&conn, &make_session("20240001", 1, "task-1")).unwrap();
        store.stage(&conn, &make_session("20240001", 2, "task-2")).unwrap();

        let engine = Reconciler::new(Box::new(SqliteStagingStore::new()), 1);
        let report = engine.reconcile_task(&conn, None).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(store.list_pending(&conn, None, 10).unwrap().len(), 0);
    }

    #[test]
    fn staging_errors_convert() {
        let err: ReconciliationError = StagingError::NotFound("x".into()).into();
        assert!(err.to_string().contains("x"));
    }
}
