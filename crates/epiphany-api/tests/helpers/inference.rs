use anyhow::{anyhow, Result};
use async_trait::async_trait;
use epiphany_api::InferenceClient;
use epiphany_core::models::{InferenceResult, QueueName};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded `infer` call
#[derive(Debug, Clone)]
pub struct InferCall {
    pub queue: QueueName,
    pub path: String,
    pub payload: Value,
}

/// Inference double. `infer` answers from a script, falling back to a
/// default image result once the script runs out.
#[derive(Default)]
pub struct ScriptedInference {
    script: Mutex<VecDeque<Result<InferenceResult, String>>>,
    calls: Mutex<Vec<InferCall>>,
    explain_calls: Mutex<Vec<Uuid>>,
    unhealthy: bool,
    hanging: bool,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every worker health check fails
    pub fn unhealthy() -> Self {
        Self {
            unhealthy: true,
            ..Self::default()
        }
    }

    /// `infer` never answers
    pub fn hanging() -> Self {
        Self {
            hanging: true,
            ..Self::default()
        }
    }

    pub fn push_ok(&self, result: InferenceResult) {
        self.script.lock().unwrap().push_back(Ok(result));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<InferCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn explain_calls(&self) -> Vec<Uuid> {
        self.explain_calls.lock().unwrap().clone()
    }
}

/// Result with one output and one preview in the recording bucket
pub fn image_result(name: &str) -> InferenceResult {
    InferenceResult {
        output_url: Some(super::storage::object_url(&format!("{}.png", name))),
        preview_urls: vec![super::storage::object_url(&format!("{}-preview.jpg", name))],
        duration_ms: Some(1200),
        model_hash: Some("sdxl-base@1".to_string()),
        ..InferenceResult::default()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn infer(&self, queue: QueueName, path: &str, payload: &Value) -> Result<InferenceResult> {
        self.calls.lock().unwrap().push(InferCall {
            queue,
            path: path.to_string(),
            payload: payload.clone(),
        });
        if self.hanging {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(image_result("default")),
        }
    }

    async fn explain(&self, generation_id: Uuid) -> Result<InferenceResult> {
        self.explain_calls.lock().unwrap().push(generation_id);
        Ok(InferenceResult {
            token_scores: Some(serde_json::json!([{"token": "cat", "score": 0.9}])),
            heatmap_urls: vec![super::storage::object_url(&format!(
                "explain/{}/heat-0.png",
                generation_id
            ))],
            ..InferenceResult::default()
        })
    }

    async fn health(&self, _queue: QueueName) -> Result<()> {
        if self.unhealthy {
            Err(anyhow!("HTTP 503 unavailable"))
        } else {
            Ok(())
        }
    }
}
