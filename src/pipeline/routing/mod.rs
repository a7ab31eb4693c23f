//! Document router: files scanned forms either under an existing guide
//! (`fichas`) or in the pending bucket (`fichas_pendentes`).

pub mod filename;
pub mod hash;
pub mod router;
pub mod sidecar;
pub mod storage;
pub mod types;

pub use filename::build_file_name;
pub use hash::compute_content_hash;
pub use router::DocumentRouter;
pub use sidecar::SidecarExtractor;
pub use storage::{storage_from_config, HttpObjectStorage, LocalFileStorage};
pub use types::*;

use std::path::Path;

use thiserror::Error;

use crate::db::DatabaseError;

/// Per-file routing failure. Never aborts sibling files.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Extracted fields carry no numero_guia")]
    MissingGuideNumber,

    #[error("Upload failed for {key}")]
    Upload { key: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for RoutingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

/// External field extraction over a scanned document.
pub trait DocumentExtractor {
    fn extract(&self, file: &Path) -> ExtractionOutcome;
}

/// External file storage. `None` when the upload did not go through.
pub trait FileStorage {
    fn upload(&self, local_path: &Path, destination_key: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_traits_are_object_safe() {
        fn _extractor(_: &dyn DocumentExtractor) {}
        fn _storage(_: &dyn FileStorage) {}
    }
}
