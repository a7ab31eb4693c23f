use serde::{Deserialize, Serialize};

use super::enums::{FichaStatus, TipoReferencia};

/// A stored file. One row per distinct content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub id: String,
    pub content_hash: String,
    pub nome: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
    pub tipo_referencia: TipoReferencia,
    pub created_at: String,
}

/// A scanned document matched to a known guide, awaiting conference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ficha {
    pub id: String,
    pub guia_id: String,
    pub numero_guia: String,
    pub codigo_ficha: Option<String>,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    pub data_atendimento: Option<String>,
    pub storage_object_id: String,
    pub arquivo_url: String,
    pub status: FichaStatus,
    pub created_at: String,
}

/// A scanned document whose guide is not in the ledger yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FichaPendente {
    pub id: String,
    pub numero_guia: String,
    pub paciente_nome: Option<String>,
    pub storage_object_id: String,
    pub arquivo_url: String,
    pub dados_extraidos: serde_json::Value,
    pub observacoes: Option<String>,
    pub status: FichaStatus,
    pub created_at: String,
}
