use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::enums::{StatusBiometria, TipoBiometria};
use crate::models::{CouncilCredentials, ExecutionRecord};

const EXECUTION_COLUMNS: &str = "id, guia_id, staged_session_id, numero_guia, codigo_ficha,
    data_execucao, data_atendimento_completa, paciente_nome, paciente_carteirinha,
    profissional_executante, conselho_profissional, numero_conselho, uf_conselho, codigo_cbo,
    status_biometria, tipo_biometria, origem, created_at";

/// Insert an execution unless one already exists for the same staged session.
/// Returns `false` when the insert was skipped.
pub fn insert_execution(conn: &Connection, exec: &ExecutionRecord) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO execucoes (id, guia_id, staged_session_id, numero_guia, codigo_ficha,
         data_execucao, data_atendimento_completa, paciente_nome, paciente_carteirinha,
         profissional_executante, conselho_profissional, numero_conselho, uf_conselho, codigo_cbo,
         status_biometria, tipo_biometria, origem, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(staged_session_id) DO NOTHING",
        params![
            exec.id,
            exec.guia_id,
            exec.staged_session_id,
            exec.numero_guia,
            exec.codigo_ficha,
            exec.data_execucao,
            exec.data_atendimento_completa,
            exec.paciente_nome,
            exec.paciente_carteirinha,
            exec.profissional_executante,
            exec.credentials.conselho_profissional,
            exec.credentials.numero_conselho,
            exec.credentials.uf_conselho,
            exec.credentials.codigo_cbo,
            exec.status_biometria.as_str(),
            exec.tipo_biometria.as_str(),
            exec.origem,
            exec.created_at,
        ],
    )?;
    Ok(inserted == 1)
}

pub fn find_execution_by_staged(
    conn: &Connection,
    staged_session_id: &str,
) -> Result<Option<ExecutionRecord>, DatabaseError> {
    let sql = format!("SELECT {EXECUTION_COLUMNS} FROM execucoes WHERE staged_session_id = ?1");
    let row = conn
        .query_row(&sql, params![staged_session_id], read_execution_row)
        .optional()?;
    row.map(execution_from_row).transpose()
}

pub fn list_executions_for_guide(
    conn: &Connection,
    guia_id: &str,
) -> Result<Vec<ExecutionRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {EXECUTION_COLUMNS} FROM execucoes WHERE guia_id = ?1
         ORDER BY data_execucao ASC, created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![guia_id], read_execution_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(execution_from_row(row?)?);
    }
    Ok(records)
}

pub fn count_executions_for_staged(
    conn: &Connection,
    staged_session_id: &str,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM execucoes WHERE staged_session_id = ?1",
        params![staged_session_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct ExecutionRow {
    id: String,
    guia_id: String,
    staged_session_id: String,
    numero_guia: String,
    codigo_ficha: String,
    data_execucao: String,
    data_atendimento_completa: String,
    paciente_nome: Option<String>,
    paciente_carteirinha: Option<String>,
    profissional_executante: Option<String>,
    credentials: CouncilCredentials,
    status_biometria: String,
    tipo_biometria: String,
    origem: String,
    created_at: String,
}

fn read_execution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        id: row.get(0)?,
        guia_id: row.get(1)?,
        staged_session_id: row.get(2)?,
        numero_guia: row.get(3)?,
        codigo_ficha: row.get(4)?,
        data_execucao: row.get(5)?,
        data_atendimento_completa: row.get(6)?,
        paciente_nome: row.get(7)?,
        paciente_carteirinha: row.get(8)?,
        profissional_executante: row.get(9)?,
        credentials: CouncilCredentials {
            conselho_profissional: row.get(10)?,
            numero_conselho: row.get(11)?,
            uf_conselho: row.get(12)?,
            codigo_cbo: row.get(13)?,
        },
        status_biometria: row.get(14)?,
        tipo_biometria: row.get(15)?,
        origem: row.get(16)?,
        created_at: row.get(17)?,
    })
}

fn execution_from_row(row: ExecutionRow) -> Result<ExecutionRecord, DatabaseError> {
    Ok(ExecutionRecord {
        id: row.id,
        guia_id: row.guia_id,
        staged_session_id: row.staged_session_id,
        numero_guia: row.numero_guia,
        codigo_ficha: row.codigo_ficha,
        data_execucao: row.data_execucao,
        data_atendimento_completa: row.data_atendimento_completa,
        paciente_nome: row.paciente_nome,
        paciente_carteirinha: row.paciente_carteirinha,
        profissional_executante: row.profissional_executante,
        credentials: row.credentials,
        status_biometria: StatusBiometria::from_str(&row.status_biometria)?,
        tipo_biometria: TipoBiometria::from_str(&row.tipo_biometria)?,
        origem: row.origem,
        created_at: row.created_at,
    })
}
