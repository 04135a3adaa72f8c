//! Outbound calls to the inference workers
//!
//! One worker per capability (image, video, edit, explain). Any non-2xx
//! response or transport failure, including the bounded timeout, is an error
//! the job handler records and re-raises.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use epiphany_core::models::{EditOperation, InferenceResult, QueueName};
use epiphany_core::InferenceConfig;

/// Worker path for an image generation payload
pub fn image_route(payload: &Value) -> &'static str {
    let has = |key: &str| payload.get(key).is_some_and(|v| !v.is_null());
    if has("controlnet") {
        "/infer/controlnet"
    } else if has("maskUrl") {
        "/infer/inpaint"
    } else if has("initImageUrl") {
        "/infer/img2img"
    } else {
        "/infer/txt2img"
    }
}

/// Worker path for a video generation payload
pub fn video_route(payload: &Value) -> &'static str {
    if payload.get("sourceImageUrl").is_some_and(|v| !v.is_null()) {
        "/infer/animate"
    } else {
        "/infer/t2v"
    }
}

pub fn edit_route(operation: EditOperation) -> String {
    format!("/{}", operation.as_str())
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// POST `payload` to the worker serving `queue` at `path`
    async fn infer(&self, queue: QueueName, path: &str, payload: &Value) -> Result<InferenceResult>;

    /// Attention heatmaps and token scores for a finished image generation
    async fn explain(&self, generation_id: Uuid) -> Result<InferenceResult>;

    /// `GET /health` on the worker serving `queue`
    async fn health(&self, queue: QueueName) -> Result<()>;
}

pub struct HttpInferenceClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

impl HttpInferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build inference HTTP client")?;
        Ok(Self { http, config })
    }

    fn base(&self, queue: QueueName) -> &str {
        let base = match queue {
            QueueName::GenerateImage => &self.config.image_url,
            QueueName::GenerateVideo => &self.config.video_url,
            QueueName::EditImage => &self.config.edit_url,
            QueueName::Explain => &self.config.explain_url,
        };
        base.trim_end_matches('/')
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {} {}", status.as_u16(), body.trim()));
        }
        response
            .json::<Value>()
            .await
            .context("Inference worker returned invalid JSON")
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        Self::read_json(response).await
    }
}

fn parse_result(value: Value) -> Result<InferenceResult> {
    serde_json::from_value(value).context("Unexpected inference response shape")
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    #[tracing::instrument(skip(self, payload), fields(queue = %queue))]
    async fn infer(&self, queue: QueueName, path: &str, payload: &Value) -> Result<InferenceResult> {
        let url = format!("{}{}", self.base(queue), path);
        tracing::debug!(url = %url, "Dispatching to inference worker");

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        parse_result(Self::read_json(response).await?)
    }

    #[tracing::instrument(skip(self), fields(generation.id = %generation_id))]
    async fn explain(&self, generation_id: Uuid) -> Result<InferenceResult> {
        let base = self.base(QueueName::Explain);
        let attention = self
            .get_json(&format!("{}/attention/{}", base, generation_id))
            .await?;
        let tokens = self
            .get_json(&format!("{}/tokens/{}", base, generation_id))
            .await?;
        Ok(merge_explain(attention, tokens))
    }

    async fn health(&self, queue: QueueName) -> Result<()> {
        let url = format!("{}/health", self.base(queue));
        let response = self.http.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("HTTP {}", response.status().as_u16()))
        }
    }
}

/// `heatmap_urls` from the attention call, `token_scores` from the tokens call
pub fn merge_explain(attention: Value, tokens: Value) -> InferenceResult {
    let heatmap_urls = attention
        .get("heatmap_urls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let token_scores = tokens.get("token_scores").cloned().filter(|v| !v.is_null());

    InferenceResult {
        heatmap_urls,
        token_scores,
        ..InferenceResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_route_picks_most_specific_mode() {
        assert_eq!(image_route(&json!({"prompt": "a cat"})), "/infer/txt2img");
        assert_eq!(
            image_route(&json!({"initImageUrl": "https://x/in.png"})),
            "/infer/img2img"
        );
        assert_eq!(
            image_route(&json!({"initImageUrl": "https://x/in.png", "maskUrl": "https://x/m.png"})),
            "/infer/inpaint"
        );
        assert_eq!(
            image_route(&json!({"controlnet": {"type": "canny"}, "maskUrl": "https://x/m.png"})),
            "/infer/controlnet"
        );
    }

    #[test]
    fn test_video_route() {
        assert_eq!(video_route(&json!({"prompt": "waves"})), "/infer/t2v");
        assert_eq!(
            video_route(&json!({"sourceImageUrl": "https://x/in.png"})),
            "/infer/animate"
        );
    }

    #[test]
    fn test_edit_route_uses_operation_name() {
        assert_eq!(edit_route(EditOperation::RemoveBg), "/remove-bg");
        assert_eq!(edit_route(EditOperation::Upscale), "/upscale");
    }

    #[test]
    fn test_merge_explain() {
        let merged = merge_explain(
            json!({"heatmap_urls": ["https://x/h1.png", "https://x/h2.png"]}),
            json!({"token_scores": [{"token": "cat", "score": 0.9}]}),
        );
        assert_eq!(merged.heatmap_urls.len(), 2);
        assert_eq!(merged.token_scores.unwrap()[0]["token"], "cat");
        assert!(merged.output_url.is_none());

        let empty = merge_explain(json!({}), json!({"token_scores": null}));
        assert!(empty.heatmap_urls.is_empty());
        assert!(empty.token_scores.is_none());
    }

    #[test]
    fn test_base_trims_trailing_slash() {
        let client = HttpInferenceClient::new(InferenceConfig {
            image_url: "http://img:8001/".to_string(),
            ..InferenceConfig::default()
        })
        .unwrap();
        assert_eq!(client.base(QueueName::GenerateImage), "http://img:8001");
        assert_eq!(client.base(QueueName::Explain), "http://localhost:8004");
    }
}
