//! Shared key generation for storage backends.
//!
//! Key format: `{category}/{filename}`.

use cardhub_core::models::MediaCategory;

use crate::traits::{StorageError, StorageResult};

/// Build the storage key for `filename` inside `category`.
///
/// Filenames are single path segments; anything that could escape the category folder is
/// rejected before a backend sees it.
pub fn storage_key(category: MediaCategory, filename: &str) -> StorageResult<String> {
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(StorageError::InvalidKey(format!(
            "Invalid filename for {} storage: {:?}",
            category, filename
        )));
    }
    Ok(format!("{}/{}", category.as_str(), filename))
}
