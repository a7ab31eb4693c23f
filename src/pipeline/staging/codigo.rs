use uuid::Uuid;

/// Prefix of codes generated at capture time, before promotion.
pub const TEMP_PREFIX: &str = "TEMP_";

/// Prefix of ledger codes assigned on promotion.
pub const PERMANENT_PREFIX: &str = "FICHA-";

/// `TEMP_<guia>_<data>_<ordem>`, with the date reduced to its digits.
pub fn temporary_code(numero_guia: &str, data_execucao: &str, ordem: u32) -> String {
    let data: String = data_execucao.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{TEMP_PREFIX}{}_{}_{}", numero_guia.trim(), data, ordem)
}

pub fn is_temporary_code(codigo: &str) -> bool {
    codigo.starts_with(TEMP_PREFIX)
}

/// Fresh ledger code, `FICHA-` followed by ten uppercase hex digits.
pub fn permanent_code() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{PERMANENT_PREFIX}{}", &id[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_code_shape() {
        assert_eq!(temporary_code("20240001", "15/01/2024", 2), "TEMP_20240001_15012024_2");
    }

    #[test]
    fn recognises_temporary_codes() {
        assert!(is_temporary_code("TEMP_1_2_3"));
        assert!(!is_temporary_code("FC-2024-0001"));
    }

    #[test]
    fn permanent_codes_are_distinct_and_not_temporary() {
        let a = permanent_code();
        let b = permanent_code();
        assert_ne!(a, b);
        assert!(a.starts_with(PERMANENT_PREFIX));
        assert_eq!(a.len(), PERMANENT_PREFIX.len() + 10);
        assert!(!is_temporary_code(&a));
    }
}
