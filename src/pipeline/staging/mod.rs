//! Staging store for captured sessions.
//!
//! Rows enter as `pendente` and leave through the reconciliation engine as
//! `processado` or `erro`. `processando` marks a row claimed by a worker.

pub mod codigo;
pub mod store;

pub use codigo::{is_temporary_code, permanent_code, temporary_code};
pub use store::SqliteStagingStore;

use chrono::Duration;
use rusqlite::Connection;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::enums::StagedStatus;
use crate::models::{NewStagedSession, StagedSession, StagingStats};

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Session already staged with codigo_ficha {codigo_ficha}")]
    Duplicate { codigo_ficha: String },

    #[error("Staged session not found: {0}")]
    NotFound(String),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: StagedStatus,
        to: StagedStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for StagingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

/// Operations over the `sessoes_staging` table.
pub trait StagingStore: Send + Sync {
    /// Validate and insert a captured session as `pendente`. Returns the new id.
    fn stage(&self, conn: &Connection, session: &NewStagedSession) -> Result<String, StagingError>;

    fn get(&self, conn: &Connection, id: &str) -> Result<StagedSession, StagingError>;

    /// Compare-and-swap `pendente -> processando`. `false` if another worker got there first.
    fn claim(&self, conn: &Connection, id: &str) -> Result<bool, StagingError>;

    /// Move to `erro` keeping only the latest reason. Repeating it is harmless.
    fn mark_error(&self, conn: &Connection, id: &str, reason: &str) -> Result<(), StagingError>;

    /// `pendente|processando -> processado`. `Ok(false)` if already processed.
    fn mark_processed(&self, conn: &Connection, id: &str) -> Result<bool, StagingError>;

    /// Same as `mark_processed`, replacing a temporary code with the permanent one.
    fn mark_promoted(
        &self,
        conn: &Connection,
        id: &str,
        permanent_code: &str,
    ) -> Result<bool, StagingError>;

    /// Oldest-first `pendente` rows, optionally restricted to one task.
    fn list_pending(
        &self,
        conn: &Connection,
        task_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<StagedSession>, StagingError>;

    fn stats(&self, conn: &Connection, task_id: &str) -> Result<StagingStats, StagingError>;

    /// Manual requeue: `erro -> pendente` for one task, clearing the reason.
    fn requeue_errors(&self, conn: &Connection, task_id: &str) -> Result<u32, StagingError>;

    /// Release rows stuck in `processando` for longer than `older_than`.
    fn release_stale(&self, conn: &Connection, older_than: Duration) -> Result<u32, StagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_trait_is_object_safe() {
        fn _assert_store(_: &dyn StagingStore) {}
    }
}
