use chrono::{DateTime, Utc};

/// Name produced when neither code nor patient name is known.
pub const DEGENERATE_NAME: &str = "sem_codigo - sem_nome - .pdf";

const MAX_NAME_LEN: usize = 200;

/// `"<codigo> - <nome> - <dd-mm-YYYY>.pdf"`, restricted to alphanumerics,
/// space, `-`, `_` and `.`.
///
/// Without a code and a name the result falls back to
/// `"<codigo or sem_codigo>_<YYYYmmdd_HHMMSS>.pdf"`.
pub fn build_file_name(
    codigo_ficha: Option<&str>,
    paciente_nome: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let codigo = clean_part(codigo_ficha);
    let nome = clean_part(paciente_nome);

    if codigo.is_some() || nome.is_some() {
        let name = format!(
            "{} - {} - {}.pdf",
            codigo.as_deref().unwrap_or("sem_codigo"),
            nome.as_deref().unwrap_or("sem_nome"),
            now.format("%d-%m-%Y"),
        );
        if name != DEGENERATE_NAME {
            return name;
        }
    }

    format!(
        "{}_{}.pdf",
        codigo.as_deref().unwrap_or("sem_codigo"),
        now.format("%Y%m%d_%H%M%S"),
    )
}

fn clean_part(part: Option<&str>) -> Option<String> {
    part.map(|p| strip(p).trim().to_string())
        .filter(|p| !p.is_empty())
}

fn strip(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .take(MAX_NAME_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn regular_name() {
        assert_eq!(
            build_file_name(Some("FC-1001"), Some("João da Silva"), at()),
            "FC-1001 - João da Silva - 09-03-2024.pdf"
        );
    }

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(
            build_file_name(Some("FC/10:01"), Some("Ana <Lima>"), at()),
            "FC1001 - Ana Lima - 09-03-2024.pdf"
        );
    }

    #[test]
    fn missing_name_uses_placeholder() {
        assert_eq!(
            build_file_name(Some("FC-1001"), None, at()),
            "FC-1001 - sem_nome - 09-03-2024.pdf"
        );
    }

    #[test]
    fn empty_code_and_name_fall_back_to_timestamp() {
        let name = build_file_name(Some(""), Some("  "), at());
        assert_eq!(name, "sem_codigo_20240309_140507.pdf");
        assert_ne!(name, DEGENERATE_NAME);
    }

    #[test]
    fn absent_code_and_name_fall_back_to_timestamp() {
        assert_eq!(build_file_name(None, None, at()), "sem_codigo_20240309_140507.pdf");
    }

    #[test]
    fn name_made_only_of_stripped_characters_falls_back() {
        let name = build_file_name(Some("///"), Some("<>"), at());
        assert_eq!(name, "sem_codigo_20240309_140507.pdf");
    }
}
