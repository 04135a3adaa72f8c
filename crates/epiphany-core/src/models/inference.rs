//! Response payload returned by the external inference workers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::generation::GenerationOutput;

/// Metadata a worker may report for an object it wrote to storage
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectMeta {
    pub url: String,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub bytes: Option<i64>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Union of the fields the image, video, edit and explain workers return.
/// Unknown fields are kept in `extra` so the stored job result stays verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceResult {
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub preview_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_scores: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_scores: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heatmap_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectMeta>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl InferenceResult {
    pub fn to_output(&self) -> GenerationOutput {
        GenerationOutput {
            output_url: self.output_url.clone(),
            preview_urls: self.preview_urls.clone(),
            duration_ms: self.duration_ms,
            model_hash: self.model_hash.clone(),
            safety: self.safety_scores.clone(),
        }
    }

    /// Metadata reported for `url`, if any
    pub fn object_meta(&self, url: &str) -> Option<&ObjectMeta> {
        self.objects.iter().find(|o| o.url == url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_worker_response() {
        let r: InferenceResult = serde_json::from_value(json!({"output_url": null})).unwrap();
        assert_eq!(r.output_url, None);
        assert!(r.preview_urls.is_empty());
        assert_eq!(r.to_output(), GenerationOutput::default());
    }

    #[test]
    fn test_image_worker_response() {
        let r: InferenceResult = serde_json::from_value(json!({
            "output_url": "https://x/out.png",
            "preview_urls": ["https://x/p1.png"],
            "duration_ms": 1200,
            "model_hash": "sdxl-base",
            "safety_scores": {"nsfw": 0.01},
            "objects": [{"url": "https://x/out.png", "bytes": 2048, "width": 1024, "height": 1024}]
        }))
        .unwrap();
        let out = r.to_output();
        assert_eq!(out.output_url.as_deref(), Some("https://x/out.png"));
        assert_eq!(out.duration_ms, Some(1200));
        assert_eq!(out.safety, Some(json!({"nsfw": 0.01})));
        assert_eq!(r.object_meta("https://x/out.png").and_then(|m| m.width), Some(1024));
        assert!(r.object_meta("https://x/p1.png").is_none());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let r: InferenceResult =
            serde_json::from_value(json!({"output_url": "u", "seed_used": 9})).unwrap();
        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["seed_used"], 9);
        assert!(back.get("caption").is_none());
    }
}
