use async_trait::async_trait;
use cardhub_core::models::MediaCategory;
use thiserror::Error;

use crate::StorageBackend;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not store file: {0}")]
    UploadFailed(String),

    #[error("could not read file: {0}")]
    DownloadFailed(String),

    #[error("could not remove file: {0}")]
    DeleteFailed(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage backend error: {0}")]
    BackendError(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("storage misconfigured: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The file store holding aggregate media.
///
/// Files are written once under a freshly generated filename and never overwritten, so
/// concurrent requests cannot collide on a key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` as `{category}/{filename}` and return `(storage_key, public_url)`.
    async fn upload(
        &self,
        category: MediaCategory,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)>;

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Remove a file. A key that does not exist counts as removed.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    fn public_url(&self, storage_key: &str) -> String;

    fn backend_type(&self) -> StorageBackend;
}
