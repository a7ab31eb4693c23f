//! Biometric status classifier.
//!
//! Maps the portal's visual indicator (icon alt-text plus icon path) to a
//! `(status_biometria, tipo_biometria)` pair. Total and deterministic: every
//! input, including empty strings, yields a pair.

use serde::{Deserialize, Serialize};

use crate::models::enums::{StatusBiometria, TipoBiometria};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Biometria {
    pub status_biometria: StatusBiometria,
    pub tipo_biometria: TipoBiometria,
}

impl Biometria {
    pub const fn new(status_biometria: StatusBiometria, tipo_biometria: TipoBiometria) -> Self {
        Self {
            status_biometria,
            tipo_biometria,
        }
    }

    pub const UNKNOWN: Self = Self::new(StatusBiometria::Desconhecido, TipoBiometria::Nenhum);
}

/// Rules are checked in order; the first match wins.
pub fn classify(indicator_text: &str, icon_path: &str) -> Biometria {
    let text = indicator_text.trim();
    let path = icon_path.trim();

    if text.contains("facial executada com sucesso") || path.contains("facial-sucesso") {
        return Biometria::new(StatusBiometria::Sucesso, TipoBiometria::Facial);
    }
    if text.contains("efetuada com sucesso") || path.contains("digital-sucesso") {
        return Biometria::new(StatusBiometria::Sucesso, TipoBiometria::Digital);
    }
    if text.contains("Problema") || path.contains("erro") {
        return Biometria::new(StatusBiometria::Erro, TipoBiometria::Facial);
    }
    if text.contains("não realizada") {
        return Biometria::new(StatusBiometria::NaoRealizada, TipoBiometria::Nenhum);
    }
    Biometria::UNKNOWN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facial_success_from_text() {
        let b = classify("Biometria facial executada com sucesso", "");
        assert_eq!(b, Biometria::new(StatusBiometria::Sucesso, TipoBiometria::Facial));
    }

    #[test]
    fn facial_success_from_path() {
        let b = classify("", "/static/img/facial-sucesso.png");
        assert_eq!(b, Biometria::new(StatusBiometria::Sucesso, TipoBiometria::Facial));
    }

    #[test]
    fn digital_success() {
        assert_eq!(
            classify("Biometria efetuada com sucesso", ""),
            Biometria::new(StatusBiometria::Sucesso, TipoBiometria::Digital)
        );
        assert_eq!(
            classify("", "/img/digital-sucesso.svg"),
            Biometria::new(StatusBiometria::Sucesso, TipoBiometria::Digital)
        );
    }

    #[test]
    fn problem_beats_later_rules() {
        let b = classify("Problema ao executar biometria facial", "/img/icons/erro.png");
        assert_eq!(b, Biometria::new(StatusBiometria::Erro, TipoBiometria::Facial));
    }

    #[test]
    fn facial_success_path_beats_problem_text() {
        let b = classify("Problema anterior", "/img/facial-sucesso.png");
        assert_eq!(b.status_biometria, StatusBiometria::Sucesso);
        assert_eq!(b.tipo_biometria, TipoBiometria::Facial);
    }

    #[test]
    fn not_performed() {
        assert_eq!(
            classify("Biometria não realizada", "/img/cinza.png"),
            Biometria::new(StatusBiometria::NaoRealizada, TipoBiometria::Nenhum)
        );
    }

    #[test]
    fn empty_indicator_is_unknown() {
        assert_eq!(classify("", ""), Biometria::UNKNOWN);
        assert_eq!(classify("   ", "  "), Biometria::UNKNOWN);
    }

    #[test]
    fn unrecognised_indicator_is_unknown() {
        assert_eq!(classify("Aguardando", "/img/relogio.png"), Biometria::UNKNOWN);
    }
}
