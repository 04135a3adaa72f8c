//! Result signing gateway
//!
//! Turns stored output references into time-limited URLs on read. Signing
//! never fails a read: a reference that does not belong to the configured
//! backend, or that the backend refuses to sign, is returned unchanged.

use crate::Storage;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct UrlSigner {
    storage: Arc<dyn Storage>,
    default_ttl: Duration,
}

impl UrlSigner {
    pub fn new(storage: Arc<dyn Storage>, default_ttl: Duration) -> Self {
        Self {
            storage,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Storage key for a stored reference, if it lives in our backend
    pub fn object_key(&self, url: &str) -> Option<String> {
        self.storage.key_from_url(url)
    }

    /// Sign `url` for `ttl` (the default TTL when `None`)
    pub async fn sign(&self, url: &str, ttl: Option<Duration>) -> String {
        let Some(key) = self.storage.key_from_url(url) else {
            return url.to_string();
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.storage.get_presigned_url(&key, ttl).await {
            Ok(signed) => signed,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Failed to sign output URL, returning it unsigned");
                url.to_string()
            }
        }
    }

    pub async fn sign_opt(&self, url: Option<&str>, ttl: Option<Duration>) -> Option<String> {
        match url {
            Some(url) => Some(self.sign(url, ttl).await),
            None => None,
        }
    }

    pub async fn sign_all(&self, urls: &[String], ttl: Option<Duration>) -> Vec<String> {
        let mut signed = Vec::with_capacity(urls.len());
        for url in urls {
            signed.push(self.sign(url, ttl).await);
        }
        signed
    }
}
