//! CardHub Core Library
//!
//! This crate provides the domain models, error types, configuration and request
//! validation shared by every CardHub component.

pub mod config;
pub mod error;
pub mod forms;
pub mod models;
pub mod policy;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use policy::DeletePolicy;
pub use storage_types::StorageBackend;

/// Database identity type used by every table (`BIGSERIAL`).
pub type DbId = i64;
