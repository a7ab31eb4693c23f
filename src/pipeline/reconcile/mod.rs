//! Reconciliation: promotes `pendente` staged sessions into ledger executions.
//!
//! Each staged row is its own unit of failure. A row-level problem is written
//! back to the row as `erro` with a reason and never reaches the caller.

pub mod engine;

pub use engine::{ReconcileOutcome, ReconcileReport, Reconciler};

use thiserror::Error;

use super::staging::StagingError;
use crate::db::DatabaseError;

/// Reason recorded on a staged row when its guide is not in the ledger.
pub const GUIDE_NOT_FOUND: &str = "Guia não encontrada no banco de dados";

#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Guia não encontrada no banco de dados")]
    GuideNotFound { numero_guia: String },

    #[error("Malformed staged row: {0}")]
    MalformedRow(String),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for ReconciliationError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guide_not_found_message_matches_recorded_reason() {
        let err = ReconciliationError::GuideNotFound {
            numero_guia: "123456".into(),
        };
        assert_eq!(err.to_string(), GUIDE_NOT_FOUND);
    }
}
