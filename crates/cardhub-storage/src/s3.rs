use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use cardhub_core::models::MediaCategory;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{ObjectStoreExt, PutPayload};

use crate::keys::storage_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// Where public URLs for stored objects point.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlStyle {
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`
    VirtualHosted { region: String },
    /// `{endpoint}/{bucket}/{key}` for S3-compatible providers such as MinIO
    PathStyle { endpoint: String },
}

/// Object store backend for card photos and invitation images
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    url_style: UrlStyle,
}

fn object_path(storage_key: &str) -> StorageResult<Path> {
    if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(storage_key.to_string()));
    }
    Ok(Path::from(storage_key))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl S3Storage {
    /// Credentials come from the standard AWS environment variables. An `endpoint` switches
    /// to a path-style S3-compatible provider; plain `http://` endpoints are allowed.
    pub fn new(bucket: String, region: String, endpoint: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(&region)
            .with_bucket_name(&bucket);

        let url_style = match endpoint {
            Some(endpoint) => {
                builder = builder
                    .with_endpoint(&endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
                UrlStyle::PathStyle {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                }
            }
            None => UrlStyle::VirtualHosted { region },
        };

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        tracing::debug!(bucket = %bucket, url_style = ?url_style, "S3 storage configured");

        Ok(Self {
            store,
            bucket,
            url_style,
        })
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        category: MediaCategory,
        filename: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        let key = storage_key(category, filename)?;
        let path = object_path(&key)?;
        let size_bytes = data.len();
        let start = Instant::now();

        if let Err(e) = self
            .store
            .put(&path, PutPayload::from(Bytes::from(data)))
            .await
        {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes,
                duration_ms = elapsed_ms(start),
                "S3 upload failed"
            );
            return Err(StorageError::UploadFailed(e.to_string()));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes,
            duration_ms = elapsed_ms(start),
            "Stored object in S3"
        );

        let url = self.public_url(&key);
        Ok((key, url))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = object_path(storage_key)?;

        let object = match self.store.get(&path).await {
            Ok(object) => object,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => return Err(StorageError::DownloadFailed(e.to_string())),
        };

        object
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = object_path(storage_key)?;
        let start = Instant::now();

        match self.store.delete(&path).await {
            Ok(()) => {}
            Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(key = %storage_key, "S3 object already absent");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    duration_ms = elapsed_ms(start),
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            duration_ms = elapsed_ms(start),
            "Removed object from S3"
        );
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = object_path(storage_key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn public_url(&self, storage_key: &str) -> String {
        match &self.url_style {
            UrlStyle::VirtualHosted { region } => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, region, storage_key
            ),
            UrlStyle::PathStyle { endpoint } => {
                format!("{}/{}/{}", endpoint, self.bucket, storage_key)
            }
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
