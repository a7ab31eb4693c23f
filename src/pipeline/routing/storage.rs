use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{FileStorage, RoutingError};
use crate::config::StorageConfig;

/// Files copied under a local directory root; URLs are `file://` paths.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn copy(&self, local_path: &Path, destination_key: &str) -> Result<PathBuf, std::io::Error> {
        let target = self.root.join(destination_key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(local_path, &target)?;
        Ok(target)
    }
}

impl FileStorage for LocalFileStorage {
    fn upload(&self, local_path: &Path, destination_key: &str) -> Option<String> {
        match self.copy(local_path, destination_key) {
            Ok(target) => Some(format!("file://{}", target.display())),
            Err(e) => {
                tracing::warn!(
                    file = %local_path.display(),
                    key = destination_key,
                    error = %e,
                    "Local upload failed"
                );
                None
            }
        }
    }
}

/// Object-storage HTTP API: `POST <base>/storage/v1/object/<bucket>/<key>`.
pub struct HttpObjectStorage {
    base_url: String,
    bucket: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl HttpObjectStorage {
    pub fn new(base_url: &str, bucket: &str, token: &str, timeout_secs: u64) -> Result<Self, RoutingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RoutingError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
            client,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, key)
    }

    fn send(&self, local_path: &Path, key: &str) -> Result<(), RoutingError> {
        let body = std::fs::read(local_path)?;
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(local_path))
            .header("x-upsert", "true")
            .body(body)
            .send()
            .map_err(|e| RoutingError::HttpClient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RoutingError::HttpClient(format!("{}: {}", status.as_u16(), body)));
        }
        Ok(())
    }
}

impl FileStorage for HttpObjectStorage {
    fn upload(&self, local_path: &Path, destination_key: &str) -> Option<String> {
        match self.send(local_path, destination_key) {
            Ok(()) => Some(self.public_url(destination_key)),
            Err(e) => {
                tracing::warn!(
                    file = %local_path.display(),
                    key = destination_key,
                    error = %e,
                    "Object storage upload failed"
                );
                None
            }
        }
    }
}

/// Build the configured storage backend.
pub fn storage_from_config(config: &StorageConfig) -> Result<Box<dyn FileStorage>, RoutingError> {
    Ok(match config {
        StorageConfig::Local { root } => Box::new(LocalFileStorage::new(root.clone())),
        StorageConfig::Http {
            base_url,
            bucket,
            token,
        } => Box::new(HttpObjectStorage::new(base_url, bucket, token, 60)?),
    })
}

/// MIME type stored with the object. Scanned forms are PDFs.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_upload_copies_under_key() {
        let src_dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let file = src_dir.path().join("scan.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let storage = LocalFileStorage::new(root.path());
        let url = storage.upload(&file, "fichas/FC-1 - Ana - 01-02-2024.pdf").unwrap();

        let stored = root.path().join("fichas/FC-1 - Ana - 01-02-2024.pdf");
        assert!(stored.exists());
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("01-02-2024.pdf"));
    }

    #[test]
    fn local_upload_of_missing_file_is_none() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(root.path());
        assert!(storage
            .upload(&root.path().join("missing.pdf"), "fichas/x.pdf")
            .is_none());
    }

    #[test]
    fn http_urls() {
        let storage = HttpObjectStorage::new("https://store.example/", "documentos", "t", 5).unwrap();
        assert_eq!(
            storage.object_url("fichas/a.pdf"),
            "https://store.example/storage/v1/object/documentos/fichas/a.pdf"
        );
        assert_eq!(
            storage.public_url("fichas/a.pdf"),
            "https://store.example/storage/v1/object/public/documentos/fichas/a.pdf"
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a.PDF")), "application/pdf");
        assert_eq!(content_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
