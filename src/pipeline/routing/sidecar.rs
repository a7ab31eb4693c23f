use std::path::{Path, PathBuf};

use super::{DocumentExtractor, ExtractedFields, ExtractionOutcome};

/// Reads fields already extracted by an external tool from `<file>.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarExtractor;

impl SidecarExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn sidecar_path(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }
}

impl DocumentExtractor for SidecarExtractor {
    fn extract(&self, file: &Path) -> ExtractionOutcome {
        let sidecar = Self::sidecar_path(file);
        let raw = match std::fs::read_to_string(&sidecar) {
            Ok(raw) => raw,
            Err(e) => {
                return ExtractionOutcome::failure(format!(
                    "cannot read {}: {e}",
                    sidecar.display()
                ))
            }
        };
        match serde_json::from_str::<ExtractedFields>(&raw) {
            Ok(fields) => ExtractionOutcome::success(fields),
            Err(e) => ExtractionOutcome::failure(format!("invalid {}: {e}", sidecar.display())),
        }
    }
}
