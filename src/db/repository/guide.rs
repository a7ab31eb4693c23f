use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::opt_u32;
use crate::db::{now_timestamp, DatabaseError};
use crate::models::Guide;

/// Fields needed to register a guide in the ledger.
#[derive(Debug, Clone, Default)]
pub struct NewGuide {
    pub numero_guia: String,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    pub data_autorizacao: Option<String>,
    pub quantidade_autorizada: Option<u32>,
}

pub fn insert_guide(conn: &Connection, guide: &NewGuide) -> Result<Guide, DatabaseError> {
    let numero = guide.numero_guia.trim();
    if numero.is_empty() {
        return Err(DatabaseError::ConstraintViolation(
            "numero_guia must not be empty".into(),
        ));
    }

    let record = Guide {
        id: Uuid::new_v4().to_string(),
        numero_guia: numero.to_string(),
        paciente_nome: guide.paciente_nome.clone(),
        paciente_carteirinha: guide.paciente_carteirinha.clone(),
        data_autorizacao: guide.data_autorizacao.clone(),
        quantidade_autorizada: guide.quantidade_autorizada,
        created_at: now_timestamp(),
    };

    conn.execute(
        "INSERT INTO guias (id, numero_guia, paciente_nome, paciente_carteirinha,
         data_autorizacao, quantidade_autorizada, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.numero_guia,
            record.paciente_nome,
            record.paciente_carteirinha,
            record.data_autorizacao,
            record.quantidade_autorizada,
            record.created_at,
        ],
    )?;
    Ok(record)
}

/// Look up a guide by its portal number. Surrounding whitespace is ignored.
pub fn find_guide_by_numero(
    conn: &Connection,
    numero_guia: &str,
) -> Result<Option<Guide>, DatabaseError> {
    let guide = conn
        .query_row(
            "SELECT id, numero_guia, paciente_nome, paciente_carteirinha,
                    data_autorizacao, quantidade_autorizada, created_at
             FROM guias WHERE numero_guia = ?1",
            params![numero_guia.trim()],
            |row| {
                Ok(Guide {
                    id: row.get(0)?,
                    numero_guia: row.get(1)?,
                    paciente_nome: row.get(2)?,
                    paciente_carteirinha: row.get(3)?,
                    data_autorizacao: row.get(4)?,
                    quantidade_autorizada: opt_u32(row.get(5)?),
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(guide)
}
