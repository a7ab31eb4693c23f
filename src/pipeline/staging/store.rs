use std::str::FromStr;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::codigo::{is_temporary_code, temporary_code};
use super::{StagingError, StagingStore};
use crate::db::{format_timestamp, now_timestamp, DatabaseError};
use crate::models::enums::{StagedStatus, StatusBiometria, TipoBiometria};
use crate::models::{CouncilCredentials, NewStagedSession, StagedSession, StagingStats};

const SESSION_COLUMNS: &str = "id, numero_guia, data_atendimento_completa, data_execucao,
    paciente_nome, paciente_carteirinha, codigo_ficha, codigo_ficha_temp,
    profissional_executante, conselho_profissional, numero_conselho, uf_conselho, codigo_cbo,
    status_biometria, tipo_biometria, origem, status, error, task_id, created_at, updated_at";

/// SQLite-backed staging store.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteStagingStore;

impl SqliteStagingStore {
    pub fn new() -> Self {
        Self
    }

    fn current_status(&self, conn: &Connection, id: &str) -> Result<StagedStatus, StagingError> {
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM sessoes_staging WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let status = status.ok_or_else(|| StagingError::NotFound(id.to_string()))?;
        Ok(StagedStatus::from_str(&status)?)
    }

    fn finish_processed(
        &self,
        conn: &Connection,
        id: &str,
        permanent_code: Option<&str>,
    ) -> Result<bool, StagingError> {
        let now = now_timestamp();
        let updated = match permanent_code {
            Some(code) => conn.execute(
                "UPDATE sessoes_staging
                 SET status = 'processado', error = NULL, codigo_ficha = ?2,
                     codigo_ficha_temp = 0, updated_at = ?3
                 WHERE id = ?1 AND status IN ('pendente', 'processando')",
                params![id, code, now],
            )?,
            None => conn.execute(
                "UPDATE sessoes_staging
                 SET status = 'processado', error = NULL, updated_at = ?2
                 WHERE id = ?1 AND status IN ('pendente', 'processando')",
                params![id, now],
            )?,
        };
        if updated == 1 {
            return Ok(true);
        }

        match self.current_status(conn, id)? {
            StagedStatus::Processado => Ok(false),
            from => Err(StagingError::InvalidTransition {
                id: id.to_string(),
                from,
                to: StagedStatus::Processado,
            }),
        }
    }
}

impl StagingStore for SqliteStagingStore {
    fn stage(&self, conn: &Connection, session: &NewStagedSession) -> Result<String, StagingError> {
        let numero_guia = session.numero_guia.trim();
        if numero_guia.is_empty() {
            return Err(StagingError::MissingField("numero_guia"));
        }
        let data_completa = session.data_atendimento_completa.trim();
        if data_completa.is_empty() {
            return Err(StagingError::MissingField("data_atendimento"));
        }
        let data_execucao = match session.data_execucao.trim() {
            "" => data_completa.split_whitespace().next().unwrap_or(data_completa),
            d => d,
        };

        let codigo_ficha = match session.codigo_ficha.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => temporary_code(numero_guia, data_execucao, session.ordem),
        };
        let is_temp = is_temporary_code(&codigo_ficha);

        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let creds = &session.credentials;

        let result = conn.execute(
            "INSERT INTO sessoes_staging
             (id, numero_guia, data_atendimento_completa, data_execucao, paciente_nome,
              paciente_carteirinha, codigo_ficha, codigo_ficha_temp, profissional_executante,
              conselho_profissional, numero_conselho, uf_conselho, codigo_cbo,
              status_biometria, tipo_biometria, origem, status, task_id, created_at, updated_at,
              codigo_original)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     'pendente', ?17, ?18, ?18, ?7)",
            params![
                id,
                numero_guia,
                data_completa,
                data_execucao,
                session.paciente_nome,
                session.paciente_carteirinha,
                codigo_ficha,
                is_temp as i32,
                session.profissional_executante,
                creds.conselho_profissional,
                creds.numero_conselho,
                creds.uf_conselho,
                creds.codigo_cbo,
                session
                    .status_biometria
                    .unwrap_or(StatusBiometria::Desconhecido)
                    .as_str(),
                session.tipo_biometria.unwrap_or(TipoBiometria::Nenhum).as_str(),
                session.origem,
                session.task_id,
                now,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!(
                    staged_id = %id,
                    numero_guia,
                    codigo_ficha = %codigo_ficha,
                    task_id = ?session.task_id,
                    "Session staged"
                );
                Ok(id)
            }
            Err(e) => {
                let err = DatabaseError::Sqlite(e);
                if err.is_unique_violation() {
                    Err(StagingError::Duplicate { codigo_ficha })
                } else {
                    Err(err.into())
                }
            }
        }
    }

    fn get(&self, conn: &Connection, id: &str) -> Result<StagedSession, StagingError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessoes_staging WHERE id = ?1");
        let row = conn
            .query_row(&sql, params![id], read_session_row)
            .optional()?
            .ok_or_else(|| StagingError::NotFound(id.to_string()))?;
        session_from_row(row)
    }

    fn claim(&self, conn: &Connection, id: &str) -> Result<bool, StagingError> {
        let updated = conn.execute(
            "UPDATE sessoes_staging SET status = 'processando', updated_at = ?2
             WHERE id = ?1 AND status = 'pendente'",
            params![id, now_timestamp()],
        )?;
        Ok(updated == 1)
    }

    fn mark_error(&self, conn: &Connection, id: &str, reason: &str) -> Result<(), StagingError> {
        let updated = conn.execute(
            "UPDATE sessoes_staging SET status = 'erro', error = ?2, updated_at = ?3
             WHERE id = ?1 AND status != 'processado'",
            params![id, reason, now_timestamp()],
        )?;
        if updated == 1 {
            tracing::warn!(staged_id = %id, reason, "Staged session marked as error");
            return Ok(());
        }
        // Either missing or already promoted.
        let from = self.current_status(conn, id)?;
        Err(StagingError::InvalidTransition {
            id: id.to_string(),
            from,
            to: StagedStatus::Erro,
        })
    }

    fn mark_processed(&self, conn: &Connection, id: &str) -> Result<bool, StagingError> {
        self.finish_processed(conn, id, None)
    }

    fn mark_promoted(
        &self,
        conn: &Connection,
        id: &str,
        permanent_code: &str,
    ) -> Result<bool, StagingError> {
        self.finish_processed(conn, id, Some(permanent_code))
    }

    fn list_pending(
        &self,
        conn: &Connection,
        task_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<StagedSession>, StagingError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessoes_staging
             WHERE status = 'pendente' AND (?1 IS NULL OR task_id = ?1)
             ORDER BY created_at ASC, numero_guia ASC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![task_id, limit], read_session_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(session_from_row(row?)?);
        }
        Ok(sessions)
    }

    fn stats(&self, conn: &Connection, task_id: &str) -> Result<StagingStats, StagingError> {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM sessoes_staging WHERE task_id = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        let mut stats = StagingStats::default();
        for row in rows {
            let (status, count) = row?;
            match StagedStatus::from_str(&status)? {
                StagedStatus::Pendente => stats.pendente = count,
                StagedStatus::Processando => stats.processando = count,
                StagedStatus::Processado => stats.processado = count,
                StagedStatus::Erro => stats.erro = count,
            }
        }
        Ok(stats)
    }

    fn requeue_errors(&self, conn: &Connection, task_id: &str) -> Result<u32, StagingError> {
        let updated = conn.execute(
            "UPDATE sessoes_staging SET status = 'pendente', error = NULL, updated_at = ?2
             WHERE task_id = ?1 AND status = 'erro'",
            params![task_id, now_timestamp()],
        )?;
        tracing::info!(task_id, requeued = updated, "Errored sessions requeued");
        Ok(updated as u32)
    }

    fn release_stale(&self, conn: &Connection, older_than: Duration) -> Result<u32, StagingError> {
        let cutoff = format_timestamp(Utc::now() - older_than);
        let updated = conn.execute(
            "UPDATE sessoes_staging SET status = 'pendente', updated_at = ?2
             WHERE status = 'processando' AND updated_at < ?1",
            params![cutoff, now_timestamp()],
        )?;
        if updated > 0 {
            tracing::warn!(released = updated, "Released stale claimed sessions");
        }
        Ok(updated as u32)
    }
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct SessionRow {
    id: String,
    numero_guia: String,
    data_atendimento_completa: String,
    data_execucao: String,
    paciente_nome: Option<String>,
    paciente_carteirinha: Option<String>,
    codigo_ficha: String,
    codigo_ficha_temp: i32,
    profissional_executante: Option<String>,
    credentials: CouncilCredentials,
    status_biometria: String,
    tipo_biometria: String,
    origem: String,
    status: String,
    error: Option<String>,
    task_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        numero_guia: row.get(1)?,
        data_atendimento_completa: row.get(2)?,
        data_execucao: row.get(3)?,
        paciente_nome: row.get(4)?,
        paciente_carteirinha: row.get(5)?,
        codigo_ficha: row.get(6)?,
        codigo_ficha_temp: row.get(7)?,
        profissional_executante: row.get(8)?,
        credentials: CouncilCredentials {
            conselho_profissional: row.get(9)?,
            numero_conselho: row.get(10)?,
            uf_conselho: row.get(11)?,
            codigo_cbo: row.get(12)?,
        },
        status_biometria: row.get(13)?,
        tipo_biometria: row.get(14)?,
        origem: row.get(15)?,
        status: row.get(16)?,
        error: row.get(17)?,
        task_id: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

fn session_from_row(row: SessionRow) -> Result<StagedSession, StagingError> {
    Ok(StagedSession {
        id: row.id,
        numero_guia: row.numero_guia,
        data_atendimento_completa: row.data_atendimento_completa,
        data_execucao: row.data_execucao,
        paciente_nome: row.paciente_nome,
        paciente_carteirinha: row.paciente_carteirinha,
        codigo_ficha: row.codigo_ficha,
        codigo_ficha_temp: row.codigo_ficha_temp != 0,
        profissional_executante: row.profissional_executante,
        credentials: row.credentials,
        status_biometria: StatusBiometria::from_str(&row.status_biometria)?,
        tipo_biometria: TipoBiometria::from_str(&row.tipo_biometria)?,
        origem: row.origem,
        status: StagedStatus::from_str(&row.status)?,
        error: row.error,
        task_id: row.task_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
