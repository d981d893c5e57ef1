use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use cardhub_core::models::MediaCategory;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::keys::storage_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// Filesystem store rooted at `base_path`, served under `base_url`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Creates `base_path` if it does not exist yet.
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let root = base_path.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "cannot create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root, base_url })
    }

    /// Resolve a key below the root. Keys that could escape it are refused, and an existing
    /// file reached through a symlink must still resolve inside the root.
    fn resolve(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }

        let path = self.root.join(storage_key);
        if let Ok(real) = path.canonicalize() {
            let root = self.root.canonicalize()?;
            if !real.starts_with(&root) {
                return Err(StorageError::InvalidKey(storage_key.to_string()));
            }
        }

        Ok(path)
    }

    async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        category: MediaCategory,
        filename: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        let key = storage_key(category, filename)?;
        let path = self.resolve(&key)?;
        let start = Instant::now();

        Self::write_file(&path, &data)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", path.display(), e)))?;

        tracing::info!(
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Stored file on local disk"
        );

        let url = self.public_url(&key);
        Ok((key, url))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(storage_key)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(storage_key.to_string()),
            _ => StorageError::DownloadFailed(format!("{}: {}", path.display(), e)),
        })
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.resolve(storage_key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(key = %storage_key, "Removed file from local disk");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(key = %storage_key, "File already absent");
                Ok(())
            }
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.resolve(storage_key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
