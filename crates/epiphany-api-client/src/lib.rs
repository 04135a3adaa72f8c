//! HTTP client for the Epiphany API.
//!
//! Thin wrapper over `reqwest` with optional `x-api-key` auth, generic
//! GET/POST/DELETE helpers, and typed methods for every public route.
//! [`ApiClient::stream_job`] follows a job's server-sent progress events.

pub mod api;
pub mod sse;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub use api::{CancelResponse, DeleteResponse, Page, StreamEvent, SubmitResponse};

/// Route prefix every API path lives under
pub const API_PREFIX: &str = "/v1";

/// Non-2xx answer from the API.
///
/// Request methods return it wrapped in [`anyhow::Error`]; callers that need
/// the status downcast with `err.downcast_ref::<ApiError>()`.
#[derive(Debug, thiserror::Error)]
#[error("API request failed with status {status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    /// Machine-readable `code` from the error body, when it had one
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    code: Option<String>,
    request_id: Option<String>,
}

/// HTTP client for the Epiphany API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Create client from environment: EPIPHANY_API_URL (or API_URL) and an
    /// optional EPIPHANY_API_KEY (or API_KEY).
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("EPIPHANY_API_URL")
            .or_else(|_| std::env::var("API_URL"))
            .unwrap_or_else(|_| "http://localhost:4000".to_string());

        let api_key = std::env::var("EPIPHANY_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());

        Self::new(base_url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path below [`API_PREFIX`]
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key.as_str()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .apply_auth(request)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ApiError {
                status,
                code: body.code,
                message: body.error,
                request_id: body.request_id,
            },
            Err(_) => ApiError {
                status,
                code: None,
                message: text,
                request_id: None,
            },
        };
        Err(error.into())
    }

    /// GET request with optional query parameters. Deserializes JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut request = self.client.get(self.build_url(path));
        if !query.is_empty() {
            request = request.query(query);
        }

        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// POST JSON body and deserialize response.
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.client.post(self.build_url(path)).json(body);

        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// POST without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.post(self.build_url(path));

        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// DELETE request. Deserializes JSON response.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.delete(self.build_url(path));

        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// Raw client for custom requests. Caller must apply auth via build_url and headers.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:4000/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:4000");
        assert_eq!(
            client.build_url("/jobs/1"),
            "http://localhost:4000/v1/jobs/1"
        );
    }

    #[test]
    fn test_api_error_helpers() {
        let err = ApiError {
            status: StatusCode::NOT_FOUND,
            code: Some("NOT_FOUND".to_string()),
            message: "Job not found: 9".to_string(),
            request_id: None,
        };
        assert!(err.is_not_found());
        assert!(!err.is_rate_limited());

        let wrapped: anyhow::Error = err.into();
        let api = wrapped.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.code.as_deref(), Some("NOT_FOUND"));
    }
}
