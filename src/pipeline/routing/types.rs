use serde::{Deserialize, Serialize};

/// Fields read off a scanned form. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub numero_guia: Option<String>,
    #[serde(default)]
    pub codigo_ficha: Option<String>,
    #[serde(default)]
    pub paciente_nome: Option<String>,
    #[serde(default)]
    pub paciente_carteirinha: Option<String>,
    #[serde(default)]
    pub data_atendimento: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExtractedFields {
    /// Trimmed guide number, if any.
    pub fn numero_guia(&self) -> Option<&str> {
        non_empty(self.numero_guia.as_deref())
    }

    pub fn codigo_ficha(&self) -> Option<&str> {
        non_empty(self.codigo_ficha.as_deref())
    }

    pub fn paciente_nome(&self) -> Option<&str> {
        non_empty(self.paciente_nome.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub status: ExtractionStatus,
    pub fields: Option<ExtractedFields>,
    pub error: Option<String>,
}

impl ExtractionOutcome {
    pub fn success(fields: ExtractedFields) -> Self {
        Self {
            status: ExtractionStatus::Success,
            fields: Some(fields),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Failure,
            fields: None,
            error: Some(error.into()),
        }
    }
}

/// Bucket a document was filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Fichas,
    FichasPendentes,
}

impl Destination {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Fichas => "fichas",
            Self::FichasPendentes => "fichas_pendentes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Success,
    Duplicate,
    Error,
}

/// Result of routing one file, reported independently of its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub file: String,
    pub status: RouteStatus,
    pub destination: Option<Destination>,
    pub storage_object_id: Option<String>,
    /// Id of the `fichas` or `fichas_pendentes` row.
    pub record_id: Option<String>,
    pub arquivo_url: Option<String>,
    pub error: Option<String>,
}

impl RouteOutcome {
    pub(crate) fn error(file: String, error: String) -> Self {
        Self {
            file,
            status: RouteStatus::Error,
            destination: None,
            storage_object_id: None,
            record_id: None,
            arquivo_url: None,
            error: Some(error),
        }
    }
}

/// Counts over a batch of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: u32,
    pub duplicate: u32,
    pub error: u32,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[RouteOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut acc, o| {
            match o.status {
                RouteStatus::Success => acc.success += 1,
                RouteStatus::Duplicate => acc.duplicate += 1,
                RouteStatus::Error => acc.error += 1,
            }
            acc
        })
    }
}
