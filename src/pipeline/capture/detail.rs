//! Guide detail capture: the sessions executed under one guide.

use serde::{Deserialize, Serialize};

use super::AcquisitionError;
use crate::models::{CouncilCredentials, QueueItem};

/// One executed session read from a guide's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedSession {
    pub data_atendimento_completa: String,
    pub data_execucao: String,
    pub paciente_nome: Option<String>,
    pub paciente_carteirinha: Option<String>,
    pub codigo_ficha: Option<String>,
    pub profissional_executante: Option<String>,
    pub credentials: CouncilCredentials,
    /// Alt-text of the biometric status icon.
    pub indicator_text: String,
    /// `src` of the biometric status icon.
    pub icon_path: String,
}

/// Reads the sessions of a queued guide. Errors are retried through the queue.
pub trait SessionSource {
    fn fetch_sessions(&mut self, item: &QueueItem) -> Result<Vec<CapturedSession>, AcquisitionError>;
}
