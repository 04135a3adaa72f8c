//! Storage abstraction trait
//!
//! Inference workers write their outputs straight to the bucket and report
//! back URLs. The coordinator only needs to resolve those URLs to storage
//! keys, presign them on read and delete them when a generation goes away.

use crate::StorageBackend;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Time-limited GET URL for the object
    async fn get_presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    fn backend_type(&self) -> StorageBackend;

    /// Unsigned URL the object would be served from
    fn public_url(&self, storage_key: &str) -> String;

    /// Resolve a stored output reference to a key in this backend.
    ///
    /// Returns `None` for URLs that point somewhere else (external hosts,
    /// another bucket); those are passed through unsigned and never deleted.
    fn key_from_url(&self, url: &str) -> Option<String>;
}

/// Strip `prefix` from `url` and return the remaining key, without any query
/// string or fragment. Empty keys and keys with `..` segments are rejected.
pub(crate) fn strip_key(url: &str, prefix: &str) -> Option<String> {
    let rest = url.strip_prefix(prefix)?;
    if !prefix.ends_with('/') && !rest.starts_with('/') {
        return None;
    }
    let rest = rest.trim_start_matches('/');
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let key = &rest[..end];

    if key.is_empty() || key.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(key.to_string())
}
