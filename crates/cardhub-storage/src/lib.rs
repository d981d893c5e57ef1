//! CardHub Storage Library
//!
//! This crate provides the file store used for card photos and invitation images.
//! It includes the [`Storage`] trait and implementations for S3 and the local filesystem.
//!
//! # Storage key format
//!
//! Every backend uses the same key layout: `{category}/{filename}`, where the category is
//! `cards` or `invitations`. Keys must not contain `..` or a leading `/`. Key generation is
//! centralized in the `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use cardhub_core::models::MediaCategory;
pub use cardhub_core::StorageBackend;
pub use factory::create_storage;
pub use keys::storage_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
