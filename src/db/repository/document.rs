use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::enums::{FichaStatus, TipoReferencia};
use crate::models::{Ficha, FichaPendente, StorageObject};

pub fn insert_storage_object(conn: &Connection, obj: &StorageObject) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO storage_objects (id, content_hash, nome, url, size, content_type,
         tipo_referencia, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            obj.id,
            obj.content_hash,
            obj.nome,
            obj.url,
            obj.size as i64,
            obj.content_type,
            obj.tipo_referencia.as_str(),
            obj.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_storage_object_by_hash(
    conn: &Connection,
    content_hash: &str,
) -> Result<Option<StorageObject>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, content_hash, nome, url, size, content_type, tipo_referencia, created_at
             FROM storage_objects WHERE content_hash = ?1",
            params![content_hash],
            |row| {
                Ok((
                    StorageObject {
                        id: row.get(0)?,
                        content_hash: row.get(1)?,
                        nome: row.get(2)?,
                        url: row.get(3)?,
                        size: row.get::<_, i64>(4)?.max(0) as u64,
                        content_type: row.get(5)?,
                        tipo_referencia: TipoReferencia::Ficha,
                        created_at: row.get(7)?,
                    },
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    row.map(|(mut obj, tipo)| {
        obj.tipo_referencia = TipoReferencia::from_str(&tipo)?;
        Ok(obj)
    })
    .transpose()
}

pub fn insert_ficha(conn: &Connection, ficha: &Ficha) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO fichas (id, guia_id, numero_guia, codigo_ficha, paciente_nome,
         paciente_carteirinha, data_atendimento, storage_object_id, arquivo_url, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            ficha.id,
            ficha.guia_id,
            ficha.numero_guia,
            ficha.codigo_ficha,
            ficha.paciente_nome,
            ficha.paciente_carteirinha,
            ficha.data_atendimento,
            ficha.storage_object_id,
            ficha.arquivo_url,
            ficha.status.as_str(),
            ficha.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_ficha_by_storage_object(
    conn: &Connection,
    storage_object_id: &str,
) -> Result<Option<Ficha>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, guia_id, numero_guia, codigo_ficha, paciente_nome, paciente_carteirinha,
                    data_atendimento, storage_object_id, arquivo_url, status, created_at
             FROM fichas WHERE storage_object_id = ?1",
            params![storage_object_id],
            |row| {
                Ok((
                    Ficha {
                        id: row.get(0)?,
                        guia_id: row.get(1)?,
                        numero_guia: row.get(2)?,
                        codigo_ficha: row.get(3)?,
                        paciente_nome: row.get(4)?,
                        paciente_carteirinha: row.get(5)?,
                        data_atendimento: row.get(6)?,
                        storage_object_id: row.get(7)?,
                        arquivo_url: row.get(8)?,
                        status: FichaStatus::Pendente,
                        created_at: row.get(10)?,
                    },
                    row.get::<_, String>(9)?,
                ))
            },
        )
        .optional()?;

    row.map(|(mut ficha, status)| {
        ficha.status = FichaStatus::from_str(&status)?;
        Ok(ficha)
    })
    .transpose()
}

pub fn insert_ficha_pendente(conn: &Connection, ficha: &FichaPendente) -> Result<(), DatabaseError> {
    let dados = serde_json::to_string(&ficha.dados_extraidos).map_err(|e| {
        DatabaseError::InvalidJson {
            column: "dados_extraidos".into(),
            reason: e.to_string(),
        }
    })?;

    conn.execute(
        "INSERT INTO fichas_pendentes (id, numero_guia, paciente_nome, storage_object_id,
         arquivo_url, dados_extraidos, observacoes, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            ficha.id,
            ficha.numero_guia,
            ficha.paciente_nome,
            ficha.storage_object_id,
            ficha.arquivo_url,
            dados,
            ficha.observacoes,
            ficha.status.as_str(),
            ficha.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_ficha_pendente_by_storage_object(
    conn: &Connection,
    storage_object_id: &str,
) -> Result<Option<FichaPendente>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, numero_guia, paciente_nome, storage_object_id, arquivo_url,
                    dados_extraidos, observacoes, status, created_at
             FROM fichas_pendentes WHERE storage_object_id = ?1",
            params![storage_object_id],
            |row| {
                Ok(PendenteRow {
                    id: row.get(0)?,
                    numero_guia: row.get(1)?,
                    paciente_nome: row.get(2)?,
                    storage_object_id: row.get(3)?,
                    arquivo_url: row.get(4)?,
                    dados_extraidos: row.get(5)?,
                    observacoes: row.get(6)?,
                    status: row.get(7)?,
                    created_at: row.get(8)?,
                })
            },
        )
        .optional()?;
    row.map(pendente_from_row).transpose()
}

/// Pending documents waiting for a given guide number to appear in the ledger.
pub fn list_fichas_pendentes_for_guide(
    conn: &Connection,
    numero_guia: &str,
) -> Result<Vec<FichaPendente>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, numero_guia, paciente_nome, storage_object_id, arquivo_url,
                dados_extraidos, observacoes, status, created_at
         FROM fichas_pendentes WHERE numero_guia = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![numero_guia], |row| {
        Ok(PendenteRow {
            id: row.get(0)?,
            numero_guia: row.get(1)?,
            paciente_nome: row.get(2)?,
            storage_object_id: row.get(3)?,
            arquivo_url: row.get(4)?,
            dados_extraidos: row.get(5)?,
            observacoes: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        items.push(pendente_from_row(row?)?);
    }
    Ok(items)
}

struct PendenteRow {
    id: String,
    numero_guia: String,
    paciente_nome: Option<String>,
    storage_object_id: String,
    arquivo_url: String,
    dados_extraidos: String,
    observacoes: Option<String>,
    status: String,
    created_at: String,
}

fn pendente_from_row(row: PendenteRow) -> Result<FichaPendente, DatabaseError> {
    let dados_extraidos = serde_json::from_str(&row.dados_extraidos).map_err(|e| {
        DatabaseError::InvalidJson {
            column: "dados_extraidos".into(),
            reason: e.to_string(),
        }
    })?;
    Ok(FichaPendente {
        id: row.id,
        numero_guia: row.numero_guia,
        paciente_nome: row.paciente_nome,
        storage_object_id: row.storage_object_id,
        arquivo_url: row.arquivo_url,
        dados_extraidos,
        observacoes: row.observacoes,
        status: FichaStatus::from_str(&row.status)?,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_timestamp;
    use crate::db::sqlite::open_memory_database;

    fn make_object(hash: &str, tipo: TipoReferencia) -> StorageObject {
        StorageObject {
            id: format!("obj-{hash}"),
            content_hash: hash.into(),
            nome: "ficha.pdf".into(),
            url: "file:///tmp/ficha.pdf".into(),
            size: 1024,
            content_type: "application/pdf".into(),
            tipo_referencia: tipo,
            created_at: now_timestamp(),
        }
    }

    #[test]
    fn storage_object_found_by_hash() {
        let conn = open_memory_database().unwrap();
        insert_storage_object(&conn, &make_object("abc", TipoReferencia::FichaPendente)).unwrap();

        let found = find_storage_object_by_hash(&conn, "abc").unwrap().unwrap();
        assert_eq!(found.tipo_referencia, TipoReferencia::FichaPendente);
        assert_eq!(found.size, 1024);
        assert!(find_storage_object_by_hash(&conn, "zzz").unwrap().is_none());
    }

    #[test]
    fn same_hash_is_never_stored_twice() {
        let conn = open_memory_database().unwrap();
        insert_storage_object(&conn, &make_object("abc", TipoReferencia::Ficha)).unwrap();
        let mut dup = make_object("abc", TipoReferencia::Ficha);
        dup.id = "other".into();
        let err = insert_storage_object(&conn, &dup).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn ficha_pendente_keeps_extracted_fields() {
        let conn = open_memory_database().unwrap();
        let obj = make_object("abc", TipoReferencia::FichaPendente);
        insert_storage_object(&conn, &obj).unwrap();

        let pendente = FichaPendente {
            id: "fp-1".into(),
            numero_guia: "555555".into(),
            paciente_nome: Some("Ana".into()),
            storage_object_id: obj.id.clone(),
            arquivo_url: obj.url.clone(),
            dados_extraidos: serde_json::json!({"numero_guia": "555555", "sessoes": 4}),
            observacoes: Some("Guia não encontrada no sistema".into()),
            status: FichaStatus::Pendente,
            created_at: now_timestamp(),
        };
        insert_ficha_pendente(&conn, &pendente).unwrap();

        let loaded = find_ficha_pendente_by_storage_object(&conn, &obj.id).unwrap().unwrap();
        assert_eq!(loaded.dados_extraidos["sessoes"], 4);
        assert_eq!(list_fichas_pendentes_for_guide(&conn, "555555").unwrap().len(), 1);
    }
}
