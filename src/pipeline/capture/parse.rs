//! Row-level extraction from the portal's results table.
//!
//! Layouts differ between portal screens, so the parser locates the guide
//! number by shape (a linked all-digit cell) instead of by column index.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::browser::{Cell, Row};

/// Literal header markers that never belong to a data row.
const HEADER_MARKERS: &[&str] = &["Nº Guia", "Número"];

/// Guide numbers are longer than this many digits.
const MIN_GUIDE_DIGITS: usize = 6;

/// Shortest token accepted as a date (`d/m/yyyy`).
const MIN_DATE_LEN: usize = 8;

/// One guide as listed in the results table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideRow {
    pub numero_guia: String,
    pub data: String,
    pub hora: Option<String>,
    pub detail_link: Option<String>,
    /// Text of the remaining non-empty cells, in column order.
    pub aux: Vec<String>,
}

impl GuideRow {
    /// `data` and `hora` joined, as stored in `data_atendimento_completa`.
    pub fn data_completa(&self) -> String {
        match &self.hora {
            Some(hora) => format!("{} {}", self.data, hora),
            None => self.data.clone(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RowParseError {
    #[error("No date found for guide {numero_guia}")]
    MissingDate { numero_guia: String },
}

/// `Ok(None)` for rows that are not guide rows (headers, spacers, totals).
pub fn parse_row(row: &Row) -> Result<Option<GuideRow>, RowParseError> {
    if row.is_header || row.cells.len() < 2 {
        return Ok(None);
    }

    let Some(anchor) = row.cells.iter().position(is_guide_anchor) else {
        return Ok(None);
    };
    let numero_guia = row.cells[anchor].text.trim().to_string();

    let (date_idx, data, hora) = match row
        .cells
        .get(anchor + 1)
        .and_then(|c| split_date_time(&c.text))
    {
        Some((data, hora)) => (anchor + 1, data, hora),
        None => row
            .cells
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != anchor)
            .find_map(|(i, c)| scan_date_token(&c.text).map(|(d, h)| (i, d, h)))
            .ok_or_else(|| RowParseError::MissingDate {
                numero_guia: numero_guia.clone(),
            })?,
    };

    let aux = row
        .cells
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != anchor && *i != date_idx)
        .map(|(_, c)| c.text.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Some(GuideRow {
        numero_guia,
        data,
        hora,
        detail_link: row.cells[anchor].link.clone(),
        aux,
    }))
}

fn is_guide_anchor(cell: &Cell) -> bool {
    let text = cell.text.trim();
    cell.link.is_some()
        && text.len() >= MIN_GUIDE_DIGITS
        && text.chars().all(|c| c.is_ascii_digit())
        && !HEADER_MARKERS.iter().any(|m| text.contains(m))
}

fn is_date_token(token: &str) -> bool {
    token.contains('/') && token.chars().count() >= MIN_DATE_LEN
}

/// Adjacent-cell layout: `"15/01/2024 14:30"`.
fn split_date_time(text: &str) -> Option<(String, Option<String>)> {
    let mut parts = text.split_whitespace();
    let data = parts.next().filter(|t| is_date_token(t))?;
    let hora = parts.next().map(str::to_string);
    Some((data.to_string(), hora))
}

/// Fallback: any token shaped like a date, with a following `hh:mm` if present.
fn scan_date_token(text: &str) -> Option<(String, Option<String>)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let pos = tokens.iter().position(|t| is_date_token(t))?;
    let hora = tokens
        .get(pos + 1)
        .filter(|t| t.contains(':'))
        .map(|t| t.to_string());
    Some((tokens[pos].to_string(), hora))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_layout() {
        let row = Row::new(vec![
            Cell::link("20240001", "/guia/20240001"),
            Cell::text("15/01/2024 14:30"),
            Cell::text("Fisioterapia"),
        ]);
        let parsed = parse_row(&row).unwrap().unwrap();
        assert_eq!(parsed.numero_guia, "20240001");
        assert_eq!(parsed.data, "15/01/2024");
        assert_eq!(parsed.hora.as_deref(), Some("14:30"));
        assert_eq!(parsed.detail_link.as_deref(), Some("/guia/20240001"));
        assert_eq!(parsed.aux, vec!["Fisioterapia".to_string()]);
        assert_eq!(parsed.data_completa(), "15/01/2024 14:30");
    }

    #[test]
    fn anchor_in_later_column() {
        let row = Row::new(vec![
            Cell::text("1"),
            Cell::text("Clínica Central"),
            Cell::link("987654321", "#"),
            Cell::text("02/03/2024"),
        ]);
        let parsed = parse_row(&row).unwrap().unwrap();
        assert_eq!(parsed.numero_guia, "987654321");
        assert_eq!(parsed.data, "02/03/2024");
        assert!(parsed.hora.is_none());
        assert_eq!(parsed.aux, vec!["1".to_string(), "Clínica Central".to_string()]);
    }

    #[test]
    fn falls_back_to_scanning_for_date() {
        let row = Row::new(vec![
            Cell::text("Executada em 10/02/2024 09:15"),
            Cell::link("123456789", "#"),
            Cell::text("Sessão 2"),
        ]);
        let parsed = parse_row(&row).unwrap().unwrap();
        assert_eq!(parsed.data, "10/02/2024");
        assert_eq!(parsed.hora.as_deref(), Some("09:15"));
        assert_eq!(parsed.aux, vec!["Sessão 2".to_string()]);
    }

    #[test]
    fn header_rows_are_skipped() {
        let th = Row::header(vec![Cell::text("Nº Guia"), Cell::text("Data")]);
        assert_eq!(parse_row(&th).unwrap(), None);

        let td_header = Row::new(vec![Cell::link("Número", "#"), Cell::text("Data")]);
        assert_eq!(parse_row(&td_header).unwrap(), None);
    }

    #[test]
    fn marker_words_in_other_cells_do_not_hide_a_row() {
        let row = Row::new(vec![
            Cell::link("20240001", "/guia/20240001"),
            Cell::text("15/01/2024 14:30"),
            Cell::text("Número da carteira 00012345"),
        ]);
        let parsed = parse_row(&row).unwrap().unwrap();
        assert_eq!(parsed.numero_guia, "20240001");
        assert_eq!(parsed.aux, vec!["Número da carteira 00012345".to_string()]);
    }

    #[test]
    fn short_rows_are_skipped() {
        let row = Row::new(vec![Cell::link("20240001", "#")]);
        assert_eq!(parse_row(&row).unwrap(), None);
    }

    #[test]
    fn unlinked_or_short_numbers_are_not_anchors() {
        let unlinked = Row::new(vec![Cell::text("20240001"), Cell::text("15/01/2024")]);
        assert_eq!(parse_row(&unlinked).unwrap(), None);

        let short = Row::new(vec![Cell::link("12345", "#"), Cell::text("15/01/2024")]);
        assert_eq!(parse_row(&short).unwrap(), None);

        let mixed = Row::new(vec![Cell::link("2024-0001", "#"), Cell::text("15/01/2024")]);
        assert_eq!(parse_row(&mixed).unwrap(), None);
    }

    #[test]
    fn missing_date_is_an_error() {
        let row = Row::new(vec![Cell::link("20240001", "#"), Cell::text("sem data")]);
        assert_eq!(
            parse_row(&row).unwrap_err(),
            RowParseError::MissingDate {
                numero_guia: "20240001".into()
            }
        );
    }
}
