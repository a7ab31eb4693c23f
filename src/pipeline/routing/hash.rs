use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 of the file contents, lowercase hex.
pub fn compute_content_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&content)))
}
