use serde::{Deserialize, Serialize};

use super::enums::{StagedStatus, StatusBiometria, TipoBiometria};

/// Professional council credentials attached to a captured session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilCredentials {
    pub conselho_profissional: Option<String>,
    pub numero_conselho: Option<String>,
    pub uf_conselho: Option<String>,
    pub codigo_cbo: Option<String>,
}

/// A session as captured from the portal, before it reaches the staging table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStagedSession {
    pub numero_guia: String,
    pub data_atendimento_completa: String,
    pub data_execucao: String,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    /// Permanent code when the portal already shows one; otherwise a
    /// temporary `TEMP_` code is generated at staging time.
    pub codigo_ficha: Option<String>,
    /// 1-based position of the session within its guide.
    pub ordem: u32,
    pub profissional_executante: Option<String>,
    pub credentials: CouncilCredentials,
    pub status_biometria: Option<StatusBiometria>,
    pub tipo_biometria: Option<TipoBiometria>,
    pub origem: String,
    pub task_id: Option<String>,
}

/// One row of `sessoes_staging`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedSession {
    pub id: String,
    pub numero_guia: String,
    pub data_atendimento_completa: String,
    pub data_execucao: String,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    pub codigo_ficha: String,
    pub codigo_ficha_temp: bool,
    pub profissional_executante: Option<String>,
    pub credentials: CouncilCredentials,
    pub status_biometria: StatusBiometria,
    pub tipo_biometria: TipoBiometria,
    pub origem: String,
    pub status: StagedStatus,
    pub error: Option<String>,
    pub task_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Row counts of one task's staged sessions, grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingStats {
    pub pendente: u32,
    pub processando: u32,
    pub processado: u32,
    pub erro: u32,
}

impl StagingStats {
    pub fn total(&self) -> u32 {
        self.pendente + self.processando + self.processado + self.erro
    }

    /// Rows that have not reached a terminal state yet.
    pub fn unfinished(&self) -> u32 {
        self.pendente + self.processando
    }
}
