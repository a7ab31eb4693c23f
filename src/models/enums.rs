use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Lifecycle of a row in `sessoes_staging`.
    StagedStatus {
        Pendente => "pendente",
        Processando => "processando",
        Processado => "processado",
        Erro => "erro",
    }
);

impl StagedStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processado | Self::Erro)
    }
}

str_enum!(
    /// Lifecycle of a guide waiting for detail capture.
    QueueStatus {
        Pending => "pending",
        Processing => "processing",
        Done => "done",
        Error => "error",
    }
);

str_enum!(
    /// Aggregate state of a capture task.
    TaskStatus {
        Processing => "processing",
        WaitingProcessing => "waiting_processing",
        Completed => "completed",
        CompletedWithErrors => "completed_with_errors",
        Failed => "failed",
    }
);

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors | Self::Failed)
    }
}

str_enum!(FichaStatus {
    Pendente => "pendente",
    Conferida => "conferida",
});

str_enum!(StatusBiometria {
    Sucesso => "sucesso",
    Erro => "erro",
    NaoRealizada => "nao_realizada",
    Desconhecido => "desconhecido",
});

str_enum!(TipoBiometria {
    Facial => "facial",
    Digital => "digital",
    Nenhum => "nenhum",
});

str_enum!(
    /// Which routing table a stored file belongs to.
    TipoReferencia {
        Ficha => "ficha",
        FichaPendente => "ficha_pendente",
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn staged_status_round_trips_through_str() {
        for status in [
            StagedStatus::Pendente,
            StagedStatus::Processando,
            StagedStatus::Processado,
            StagedStatus::Erro,
        ] {
            assert_eq!(StagedStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = TaskStatus::from_str("done").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { ref field, .. } if field == "TaskStatus"));
    }

    #[test]
    fn serde_uses_storage_names() {
        let json = serde_json::to_string(&TaskStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");
        let parsed: StatusBiometria = serde_json::from_str("\"nao_realizada\"").unwrap();
        assert_eq!(parsed, StatusBiometria::NaoRealizada);
    }

    #[test]
    fn terminal_staged_states() {
        assert!(StagedStatus::Processado.is_terminal());
        assert!(StagedStatus::Erro.is_terminal());
        assert!(!StagedStatus::Processando.is_terminal());
    }

    #[test]
    fn finished_task_states() {
        assert!(TaskStatus::Failed.is_finished());
        assert!(!TaskStatus::WaitingProcessing.is_finished());
    }
}
