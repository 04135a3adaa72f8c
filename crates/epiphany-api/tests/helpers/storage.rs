use async_trait::async_trait;
use epiphany_storage::{Storage, StorageBackend, StorageError, StorageResult};
use std::sync::Mutex;
use std::time::Duration;

/// Prefix of URLs that resolve to objects in the recording backend
pub const BUCKET_URL: &str = "mem://bucket/";

/// Storage double: signs with a `?sig=` suffix and records deletes
#[derive(Default)]
pub struct RecordingStorage {
    deleted: Mutex<Vec<String>>,
    fail_deletes: bool,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delete fails with a backend error
    pub fn failing() -> Self {
        Self {
            deleted: Mutex::new(Vec::new()),
            fail_deletes: true,
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        let mut keys = self.deleted.lock().unwrap().clone();
        keys.sort();
        keys
    }
}

pub fn object_url(key: &str) -> String {
    format!("{}{}", BUCKET_URL, key)
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        if self.fail_deletes {
            return Err(StorageError::BackendError("bucket unavailable".to_string()));
        }
        self.deleted.lock().unwrap().push(storage_key.to_string());
        Ok(())
    }

    async fn get_presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        Ok(format!(
            "{}?sig={}",
            self.public_url(storage_key),
            expires_in.as_secs()
        ))
    }

    async fn exists(&self, _storage_key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn public_url(&self, storage_key: &str) -> String {
        object_url(storage_key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(BUCKET_URL)?;
        let key = key.split(['?', '#']).next().unwrap_or_default();
        (!key.is_empty()).then(|| key.to_string())
    }
}
