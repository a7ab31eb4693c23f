use serde::{Deserialize, Serialize};

use super::enums::{StatusBiometria, TipoBiometria};
use super::staged::CouncilCredentials;

/// An authorised guide already known to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guide {
    pub id: String,
    pub numero_guia: String,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    pub data_autorizacao: Option<String>,
    pub quantidade_autorizada: Option<u32>,
    pub created_at: String,
}

/// A performed service, created only by promoting a staged session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub guia_id: String,
    pub staged_session_id: String,
    pub numero_guia: String,
    pub codigo_ficha: String,
    pub data_execucao: String,
    pub data_atendimento_completa: String,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    pub profissional_executante: Option<String>,
    pub credentials: CouncilCredentials,
    pub status_biometria: StatusBiometria,
    pub tipo_biometria: TipoBiometria,
    pub origem: String,
    pub created_at: String,
}
