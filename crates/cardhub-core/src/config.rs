//! Configuration module
//!
//! Settings are read from the process environment (after loading `.env` with `dotenvy`).
//! Anything optional falls back to a development-friendly default.

use std::env;

use crate::policy::DeletePolicy;
use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_MEDIA_SIZE_MB: usize = 5;
const DEFAULT_ALLOWED_EXTENSIONS: &str = "jpg,jpeg,png,gif,webp";
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./uploads";
const DEFAULT_LOCAL_STORAGE_BASE_URL: &str = "http://localhost:3000/uploads";

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    database_url: String,
    db_max_connections: u32,
    db_timeout_seconds: u64,
    environment: String,
    log_format: LogFormat,
    storage_backend: StorageBackend,
    local_storage_path: String,
    local_storage_base_url: String,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>,
    aws_region: Option<String>,
    max_media_size_bytes: usize,
    media_allowed_extensions: Vec<String>,
    delete_policy: DeletePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let log_format = match lookup("LOG_FORMAT")
            .unwrap_or_else(|| "text".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "text" | "plain" => LogFormat::Text,
            other => return Err(anyhow::anyhow!("Invalid LOG_FORMAT: {}", other)),
        };

        let storage_backend = lookup("STORAGE_BACKEND")
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or(StorageBackend::Local);

        let delete_policy = lookup("DELETE_POLICY")
            .map(|s| s.parse::<DeletePolicy>())
            .transpose()?
            .unwrap_or_default();

        let max_media_size_mb = lookup("MAX_MEDIA_SIZE_MB")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(MAX_MEDIA_SIZE_MB);

        let media_allowed_extensions = lookup("MEDIA_ALLOWED_EXTENSIONS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_EXTENSIONS.to_string())
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Config {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: lookup("DB_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            log_format,
            storage_backend,
            local_storage_path: lookup("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_PATH.to_string()),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_BASE_URL.to_string()),
            s3_bucket: lookup("S3_BUCKET").filter(|s| !s.is_empty()),
            s3_region: lookup("S3_REGION").filter(|s| !s.is_empty()),
            s3_endpoint: lookup("S3_ENDPOINT").filter(|s| !s.is_empty()),
            aws_region: lookup("AWS_REGION").filter(|s| !s.is_empty()),
            max_media_size_bytes: max_media_size_mb * 1024 * 1024,
            media_allowed_extensions,
            delete_policy,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.max_media_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_MEDIA_SIZE_MB must be greater than 0"));
        }

        if self.media_allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "MEDIA_ALLOWED_EXTENSIONS must list at least one extension"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.trim().is_empty() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must not be empty when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.db_timeout_seconds
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    pub fn local_storage_path(&self) -> &str {
        &self.local_storage_path
    }

    pub fn local_storage_base_url(&self) -> &str {
        &self.local_storage_base_url
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.aws_region.as_deref()
    }

    pub fn max_media_size_bytes(&self) -> usize {
        self.max_media_size_bytes
    }

    pub fn media_allowed_extensions(&self) -> &[String] {
        &self.media_allowed_extensions
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/cardhub")]).unwrap();
        assert_eq!(config.db_max_connections(), 20);
        assert_eq!(config.db_timeout_seconds(), 30);
        assert_eq!(config.storage_backend(), StorageBackend::Local);
        assert_eq!(config.local_storage_path(), "./uploads");
        assert_eq!(config.max_media_size_bytes(), 5 * 1024 * 1024);
        assert_eq!(
            config.media_allowed_extensions(),
            &["jpg", "jpeg", "png", "gif", "webp"]
        );
        assert_eq!(config.delete_policy(), DeletePolicy::Hard);
        assert_eq!(config.log_format(), LogFormat::Text);
        assert!(!config.is_production());
    }

    #[test]
    fn test_database_url_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_database_url_must_be_postgres() {
        let err = config_from(&[("DATABASE_URL", "mysql://localhost/cardhub")]).unwrap_err();
        assert!(err.to_string().contains("PostgreSQL"));
    }

    #[test]
    fn test_s3_requires_bucket_and_region() {
        let err = config_from(&[
            ("DATABASE_URL", "postgresql://localhost/cardhub"),
            ("STORAGE_BACKEND", "s3"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        let err = config_from(&[
            ("DATABASE_URL", "postgresql://localhost/cardhub"),
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "media"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("S3_REGION"));

        let config = config_from(&[
            ("DATABASE_URL", "postgresql://localhost/cardhub"),
            ("STORAGE_BACKEND", "S3"),
            ("S3_BUCKET", "media"),
            ("AWS_REGION", "eu-central-1"),
        ])
        .unwrap();
        assert_eq!(config.storage_backend(), StorageBackend::S3);
        assert_eq!(config.s3_bucket(), Some("media"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db/cardhub"),
            ("APP_ENV", "production"),
            ("LOG_FORMAT", "json"),
            ("DELETE_POLICY", "soft"),
            ("MAX_MEDIA_SIZE_MB", "2"),
            ("MEDIA_ALLOWED_EXTENSIONS", " PNG, .jpg ,"),
            ("DB_MAX_CONNECTIONS", "not-a-number"),
        ])
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.delete_policy(), DeletePolicy::Soft);
        assert_eq!(config.max_media_size_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.media_allowed_extensions(), &["png", "jpg"]);
        assert_eq!(config.db_max_connections(), 20);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://db/cardhub"),
            ("DELETE_POLICY", "archive"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("archive"));
    }
}
