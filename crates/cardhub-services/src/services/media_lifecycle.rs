//! Media lifecycle around aggregate writes.
//!
//! An upload has to be read and stored before the database transaction runs, so the file
//! and the row are committed by two independent systems. [`MediaLifecycleService`] orders
//! the steps so that a committed record never points at a deleted file:
//!
//! 1. stage the new file (if any) under a fresh filename,
//! 2. run the write with the staged filename,
//! 3. on failure delete the staged file and return the write error,
//! 4. on success retire the file the write reports it replaced, logging any failure.
//!
//! The replaced filename comes from the write itself, read under the record's row lock, so a
//! concurrent update cannot make the service retire a file that is still referenced.
//!
//! A staged file is held by a [`StagedMedia`] guard. If the orchestrating future is dropped
//! before the outcome is known, the guard hands the delete to the runtime so the cleanup
//! does not depend on the cancelled task.

use std::future::Future;
use std::sync::Arc;

use cardhub_core::models::{MediaCategory, MediaUpload};
use cardhub_core::{AppError, Config};
use cardhub_storage::{storage_key, Storage, StorageError};
use uuid::Uuid;

/// Convert a file store failure into the application error taxonomy.
pub fn storage_error(err: StorageError) -> AppError {
    match err {
        StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
        other => AppError::Storage(other.to_string()),
    }
}

/// Upload constraints checked before anything is written to the store
#[derive(Debug, Clone)]
pub struct MediaLimits {
    max_size_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl MediaLimits {
    pub fn new(max_size_bytes: usize, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_size_bytes,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_media_size_bytes(),
            config.media_allowed_extensions().to_vec(),
        )
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Check `upload` and return the extension its staged filename will carry.
    pub fn check(&self, upload: &MediaUpload) -> Result<String, AppError> {
        if upload.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Uploaded file '{}' is empty",
                upload.original_filename
            )));
        }

        if upload.len() > self.max_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size exceeds maximum of {} bytes",
                self.max_size_bytes
            )));
        }

        let extension = upload.extension().ok_or_else(|| {
            AppError::InvalidInput(format!(
                "File '{}' has no extension",
                upload.original_filename
            ))
        })?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(AppError::InvalidInput(format!(
                "File extension '{}' is not allowed. Allowed: {}",
                extension,
                self.allowed_extensions.join(", ")
            )));
        }

        Ok(extension)
    }
}

/// A file written to the store whose owning transaction has not finished yet.
///
/// Dropping an armed guard schedules the delete on the current runtime.
pub struct StagedMedia {
    storage: Arc<dyn Storage>,
    category: MediaCategory,
    filename: String,
    key: String,
    armed: bool,
}

impl StagedMedia {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The record referencing this file was committed; keep the file.
    pub fn commit(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.filename)
    }

    /// Compensating delete after a failed write.
    pub async fn discard(mut self) {
        let result = self.storage.delete(&self.key).await;
        // Disarm only once the delete has finished; a cancelled discard falls back to Drop.
        self.armed = false;

        match result {
            Ok(()) => tracing::debug!(
                category = %self.category,
                storage_key = %self.key,
                "Discarded staged upload"
            ),
            Err(e) => tracing::error!(
                error = %e,
                category = %self.category,
                storage_key = %self.key,
                "Failed to discard staged upload, file is orphaned"
            ),
        }
    }
}

impl Drop for StagedMedia {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let storage = Arc::clone(&self.storage);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(storage_key = %key, "Staged upload abandoned, scheduling cleanup");
                handle.spawn(async move {
                    if let Err(e) = storage.delete(&key).await {
                        tracing::error!(
                            error = %e,
                            storage_key = %key,
                            "Failed to clean up abandoned upload"
                        );
                    }
                });
            }
            Err(_) => tracing::error!(
                storage_key = %key,
                "Staged upload abandoned outside a runtime, file is orphaned"
            ),
        }
    }
}

/// Coordinates the file store with aggregate writes
#[derive(Clone)]
pub struct MediaLifecycleService {
    storage: Arc<dyn Storage>,
    limits: MediaLimits,
}

impl MediaLifecycleService {
    pub fn new(storage: Arc<dyn Storage>, limits: MediaLimits) -> Self {
        Self { storage, limits }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn limits(&self) -> &MediaLimits {
        &self.limits
    }

    /// Validate `upload` and write it under a fresh `{uuid}.{ext}` filename.
    #[tracing::instrument(skip(self, upload), fields(category = %category, size = upload.len()))]
    pub async fn stage(
        &self,
        category: MediaCategory,
        upload: MediaUpload,
    ) -> Result<StagedMedia, AppError> {
        let extension = self.limits.check(&upload)?;
        let filename = format!("{}.{}", Uuid::new_v4(), extension);

        let (key, _url) = self
            .storage
            .upload(category, &filename, &upload.content_type, upload.data)
            .await
            .map_err(storage_error)?;

        tracing::debug!(storage_key = %key, "Staged upload");

        Ok(StagedMedia {
            storage: Arc::clone(&self.storage),
            category,
            filename,
            key,
            armed: true,
        })
    }

    /// Delete a file that no committed record references any more.
    ///
    /// Best-effort: the database already reflects the change, so failures are only logged.
    pub async fn retire(&self, category: MediaCategory, filename: &str) {
        let key = match storage_key(category, filename) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    category = %category,
                    filename = %filename,
                    "Skipping retirement of file with an invalid name"
                );
                return;
            }
        };

        match self.storage.delete(&key).await {
            Ok(()) => tracing::debug!(storage_key = %key, "Retired replaced file"),
            Err(e) => tracing::warn!(
                error = %e,
                storage_key = %key,
                "Failed to retire replaced file, leaving it in place"
            ),
        }
    }

    /// Run `write` with the filename of the staged `upload`.
    ///
    /// `write` returns its value together with the filename the record stopped referencing,
    /// as seen inside its transaction. That file is retired only after a successful write
    /// that committed a staged file. Without an upload, `write` receives `None` and no file
    /// is touched.
    pub async fn write_with_media<T, F, Fut>(
        &self,
        category: MediaCategory,
        upload: Option<MediaUpload>,
        write: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<(T, Option<String>), AppError>>,
    {
        let staged = match upload {
            Some(upload) => Some(self.stage(category, upload).await?),
            None => None,
        };
        let new_filename = staged.as_ref().map(|s| s.filename().to_string());

        match write(new_filename).await {
            Ok((value, replaced)) => {
                if let Some(staged) = staged {
                    let current = staged.commit();
                    if let Some(replaced) = replaced.filter(|r| !r.is_empty() && *r != current) {
                        self.retire(category, &replaced).await;
                    }
                }
                Ok(value)
            }
            Err(e) => {
                if let Some(staged) = staged {
                    staged.discard().await;
                }
                Err(e)
            }
        }
    }
}
