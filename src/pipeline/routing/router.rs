use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::filename::build_file_name;
use super::hash::compute_content_hash;
use super::storage::content_type_for;
use super::types::{BatchSummary, Destination, ExtractedFields, ExtractionStatus, RouteOutcome, RouteStatus};
use super::{DocumentExtractor, FileStorage, RoutingError};
use crate::db::now_timestamp;
use crate::db::repository::{
    find_ficha_by_storage_object, find_ficha_pendente_by_storage_object,
    find_guide_by_numero, find_storage_object_by_hash, insert_ficha, insert_ficha_pendente,
    insert_storage_object,
};
use crate::models::enums::{FichaStatus, TipoReferencia};
use crate::models::{Ficha, FichaPendente, Guide, StorageObject};

/// Note attached to documents whose guide is not in the ledger.
pub const PENDING_NOTE: &str = "Guia não encontrada no sistema";

/// Hex digits of the content hash used as the object key's folder.
const KEY_HASH_LEN: usize = 12;

/// `<bucket prefix>/<hash prefix>/<name>`. Distinct bytes never share a key,
/// so an upload cannot overwrite another document.
fn object_key(destination: Destination, content_hash: &str, nome: &str) -> String {
    let short = content_hash.get(..KEY_HASH_LEN).unwrap_or(content_hash);
    format!("{}/{}/{}", destination.prefix(), short, nome)
}

pub struct DocumentRouter {
    extractor: Box<dyn DocumentExtractor>,
    storage: Box<dyn FileStorage>,
}

impl DocumentRouter {
    pub fn new(extractor: Box<dyn DocumentExtractor>, storage: Box<dyn FileStorage>) -> Self {
        Self { extractor, storage }
    }

    /// Route files one at a time. A failing file is reported and the rest go on.
    pub fn route_batch(&self, conn: &Connection, files: &[PathBuf]) -> Vec<RouteOutcome> {
        let outcomes: Vec<RouteOutcome> = files.iter().map(|f| self.route_file(conn, f)).collect();

        let summary = BatchSummary::from_outcomes(&outcomes);
        tracing::info!(
            files = files.len(),
            success = summary.success,
            duplicate = summary.duplicate,
            error = summary.error,
            "Document batch routed"
        );
        outcomes
    }

    pub fn route_file(&self, conn: &Connection, file: &Path) -> RouteOutcome {
        let label = file.display().to_string();
        match self.try_route(conn, file, &label) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(file = %label, error = %e, "Document routing failed");
                RouteOutcome::error(label, e.to_string())
            }
        }
    }

    fn try_route(&self, conn: &Connection, file: &Path, label: &str) -> Result<RouteOutcome, RoutingError> {
        let content_hash = compute_content_hash(file)?;
        if let Some(outcome) = self.existing(conn, &content_hash, label)? {
            return Ok(outcome);
        }

        let extraction = self.extractor.extract(file);
        let fields = match (extraction.status, extraction.fields) {
            (ExtractionStatus::Success, Some(fields)) => fields,
            _ => {
                return Err(RoutingError::Extraction(
                    extraction.error.unwrap_or_else(|| "no fields returned".into()),
                ))
            }
        };
        let numero_guia = fields
            .numero_guia()
            .ok_or(RoutingError::MissingGuideNumber)?
            .to_string();

        let guide = find_guide_by_numero(conn, &numero_guia)?;
        let destination = match guide {
            Some(_) => Destination::Fichas,
            None => Destination::FichasPendentes,
        };

        let nome = build_file_name(fields.codigo_ficha(), fields.paciente_nome(), Utc::now());
        let key = object_key(destination, &content_hash, &nome);
        let url = self
            .storage
            .upload(file, &key)
            .ok_or_else(|| RoutingError::Upload { key: key.clone() })?;

        let size = std::fs::metadata(file)?.len();
        let object = StorageObject {
            id: Uuid::new_v4().to_string(),
            content_hash,
            nome,
            url: url.clone(),
            size,
            content_type: content_type_for(file).to_string(),
            tipo_referencia: match destination {
                Destination::Fichas => TipoReferencia::Ficha,
                Destination::FichasPendentes => TipoReferencia::FichaPendente,
            },
            created_at: now_timestamp(),
        };

        let tx = conn.unchecked_transaction()?;
        insert_storage_object(&tx, &object)?;
        let record_id = match &guide {
            Some(guide) => self.file_ficha(&tx, guide, &fields, &object)?,
            None => self.file_pendente(&tx, &numero_guia, &fields, &object)?,
        };
        tx.commit()?;

        tracing::info!(
            file = %label,
            numero_guia = %numero_guia,
            destination = destination.prefix(),
            storage_object_id = %object.id,
            "Document routed"
        );

        Ok(RouteOutcome {
            file: label.to_string(),
            status: RouteStatus::Success,
            destination: Some(destination),
            storage_object_id: Some(object.id),
            record_id: Some(record_id),
            arquivo_url: Some(url),
            error: None,
        })
    }

    /// Same bytes already routed: report the existing rows instead of duplicating them.
    fn existing(
        &self,
        conn: &Connection,
        content_hash: &str,
        label: &str,
    ) -> Result<Option<RouteOutcome>, RoutingError> {
        let Some(object) = find_storage_object_by_hash(conn, content_hash)? else {
            return Ok(None);
        };

        let (destination, record_id) = match object.tipo_referencia {
            TipoReferencia::Ficha => (
                Destination::Fichas,
                find_ficha_by_storage_object(conn, &object.id)?.map(|f| f.id),
            ),
            TipoReferencia::FichaPendente => (
                Destination::FichasPendentes,
                find_ficha_pendente_by_storage_object(conn, &object.id)?.map(|f| f.id),
            ),
        };

        tracing::info!(
            file = %label,
            storage_object_id = %object.id,
            "Document already stored, reusing existing record"
        );

        Ok(Some(RouteOutcome {
            file: label.to_string(),
            status: RouteStatus::Duplicate,
            destination: Some(destination),
            storage_object_id: Some(object.id),
            record_id,
            arquivo_url: Some(object.url),
            error: None,
        }))
    }

    fn file_ficha(
        &self,
        conn: &Connection,
        guide: &Guide,
        fields: &ExtractedFields,
        object: &StorageObject,
    ) -> Result<String, RoutingError> {
        let ficha = Ficha {
            id: Uuid::new_v4().to_string(),
            guia_id: guide.id.clone(),
            numero_guia: guide.numero_guia.clone(),
            codigo_ficha: fields.codigo_ficha().map(str::to_string),
            paciente_nome: fields
                .paciente_nome()
                .map(str::to_string)
                .or_else(|| guide.paciente_nome.clone()),
            paciente_carteirinha: fields
                .paciente_carteirinha
                .clone()
                .or_else(|| guide.paciente_carteirinha.clone()),
            data_atendimento: fields.data_atendimento.clone(),
            storage_object_id: object.id.clone(),
            arquivo_url: object.url.clone(),
            status: FichaStatus::Pendente,
            created_at: now_timestamp(),
        };
        insert_ficha(conn, &ficha)?;
        Ok(ficha.id)
    }

    fn file_pendente(
        &self,
        conn: &Connection,
        numero_guia: &str,
        fields: &ExtractedFields,
        object: &StorageObject,
    ) -> Result<String, RoutingError> {
        let dados_extraidos = serde_json::to_value(fields).map_err(|e| {
            crate::db::DatabaseError::InvalidJson {
                column: "dados_extraidos".into(),
                reason: e.to_string(),
            }
        })?;
        let pendente = FichaPendente {
            id: Uuid::new_v4().to_string(),
            numero_guia: numero_guia.to_string(),
            paciente_nome: fields.paciente_nome().map(str::to_string),
            storage_object_id: object.id.clone(),
            arquivo_url: object.url.clone(),
            dados_extraidos,
            observacoes: Some(PENDING_NOTE.to_string()),
            status: FichaStatus::Pendente,
            created_at: now_timestamp(),
        };
        insert_ficha_pendente(conn, &pendente)?;
        Ok(pendente.id)
    }
}
