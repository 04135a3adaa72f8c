use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::job::QueueName;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Image,
    Video,
}

impl Display for GenerationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            GenerationKind::Image => write!(f, "image"),
            GenerationKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for GenerationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(GenerationKind::Image),
            "video" => Ok(GenerationKind::Video),
            _ => Err(anyhow::anyhow!("Invalid generation kind: {}", s)),
        }
    }
}

/// Domain status; the store is authoritative, queue state only ever maps onto it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Succeeded | GenerationStatus::Failed | GenerationStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Queued => "queued",
            GenerationStatus::Running => "running",
            GenerationStatus::Succeeded => "succeeded",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Canceled => "canceled",
        }
    }
}

impl Display for GenerationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(GenerationStatus::Queued),
            "running" => Ok(GenerationStatus::Running),
            "succeeded" => Ok(GenerationStatus::Succeeded),
            "failed" => Ok(GenerationStatus::Failed),
            "canceled" => Ok(GenerationStatus::Canceled),
            _ => Err(anyhow::anyhow!("Invalid generation status: {}", s)),
        }
    }
}

/// Statuses a non-terminal write may start from
pub const ACTIVE_STATUSES: &[GenerationStatus] =
    &[GenerationStatus::Queued, GenerationStatus::Running];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub id: Uuid,
    pub kind: GenerationKind,
    pub status: GenerationStatus,
    /// Queue the generation was submitted to; retry re-enqueues on the same one
    pub queue: QueueName,
    /// Edit operation name (`upscale`, `crop`, ...) for edit-queue generations
    pub operation: Option<String>,
    pub params: Value,
    pub output_url: Option<String>,
    pub preview_urls: Vec<String>,
    pub duration_ms: Option<i64>,
    pub model_hash: Option<String>,
    pub safety: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Generation {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let decode = |field: &str, e: anyhow::Error| {
            sqlx::Error::Decode(format!("Failed to parse {}: {}", field, e).into())
        };
        Ok(Generation {
            id: row.get("id"),
            kind: row
                .get::<String, _>("kind")
                .parse()
                .map_err(|e| decode("kind", e))?,
            status: row
                .get::<String, _>("status")
                .parse()
                .map_err(|e| decode("status", e))?,
            queue: row
                .get::<String, _>("queue")
                .parse()
                .map_err(|e| decode("queue", e))?,
            operation: row.get("operation"),
            params: row.get("params"),
            output_url: row.get("output_url"),
            preview_urls: row
                .get::<Option<Vec<String>>, _>("preview_urls")
                .unwrap_or_default(),
            duration_ms: row.get("duration_ms"),
            model_hash: row.get("model_hash"),
            safety: row.get("safety"),
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Generation {
    pub fn prompt(&self) -> Option<&str> {
        self.params.get("prompt").and_then(Value::as_str)
    }

    /// Every object reference the generation owns, primary output first
    pub fn output_refs(&self) -> Vec<&str> {
        self.output_url
            .as_deref()
            .into_iter()
            .chain(self.preview_urls.iter().map(String::as_str))
            .collect()
    }
}

/// Row to insert on submission; always starts `queued`
#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub kind: GenerationKind,
    pub queue: QueueName,
    pub operation: Option<String>,
    pub params: Value,
}

/// Output written once, by the result-ingestion path, on terminal success
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub output_url: Option<String>,
    pub preview_urls: Vec<String>,
    pub duration_ms: Option<i64>,
    pub model_hash: Option<String>,
    pub safety: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub id: Uuid,
    pub kind: GenerationKind,
    pub status: GenerationStatus,
    pub queue: QueueName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub output_url: Option<String>,
    pub preview_urls: Vec<String>,
    pub duration_ms: Option<i64>,
    pub model_hash: Option<String>,
    pub safety: Option<Value>,
    pub error: Option<String>,
    pub input_prompt: Option<String>,
    pub aspect: Option<String>,
    pub steps: Option<i64>,
    pub cfg: Option<f64>,
    pub seed: Option<i64>,
    pub model_id: Option<String>,
    pub style_preset: Option<String>,
    pub params: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Generation> for GenerationResponse {
    fn from(g: Generation) -> Self {
        let text = |key: &str| g.params.get(key).and_then(Value::as_str).map(String::from);
        GenerationResponse {
            input_prompt: text("prompt"),
            aspect: text("aspect"),
            steps: g.params.get("steps").and_then(Value::as_i64),
            cfg: g.params.get("cfg").and_then(Value::as_f64),
            seed: g.params.get("seed").and_then(Value::as_i64),
            model_id: text("modelId"),
            style_preset: text("stylePreset"),
            id: g.id,
            kind: g.kind,
            status: g.status,
            queue: g.queue,
            operation: g.operation,
            output_url: g.output_url,
            preview_urls: g.preview_urls,
            duration_ms: g.duration_ms,
            model_hash: g.model_hash,
            safety: g.safety,
            error: g.error,
            params: g.params,
            created_at: g.created_at,
            updated_at: g.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(params: Value) -> Generation {
        let now = Utc::now();
        Generation {
            id: Uuid::new_v4(),
            kind: GenerationKind::Image,
            status: GenerationStatus::Queued,
            queue: QueueName::GenerateImage,
            operation: None,
            params,
            output_url: None,
            preview_urls: vec![],
            duration_ms: None,
            model_hash: None,
            safety: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!GenerationStatus::Queued.is_terminal());
        assert!(!GenerationStatus::Running.is_terminal());
        assert!(GenerationStatus::Succeeded.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
        assert!(GenerationStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_status_parse_rejects_british_spelling() {
        assert_eq!(
            "canceled".parse::<GenerationStatus>().unwrap(),
            GenerationStatus::Canceled
        );
        assert!("cancelled".parse::<GenerationStatus>().is_err());
    }

    #[test]
    fn test_response_extracts_input_fields() {
        let g = sample(json!({
            "prompt": "a cat",
            "aspect": "16:9",
            "steps": 30,
            "cfg": 7.5,
            "seed": 42,
            "modelId": "sdxl-base",
            "stylePreset": "noir"
        }));
        let resp = GenerationResponse::from(g);
        assert_eq!(resp.input_prompt.as_deref(), Some("a cat"));
        assert_eq!(resp.aspect.as_deref(), Some("16:9"));
        assert_eq!(resp.steps, Some(30));
        assert_eq!(resp.cfg, Some(7.5));
        assert_eq!(resp.seed, Some(42));
        assert_eq!(resp.model_id.as_deref(), Some("sdxl-base"));
        assert_eq!(resp.style_preset.as_deref(), Some("noir"));

        let body = serde_json::to_value(&resp).unwrap();
        assert_eq!(body["inputPrompt"], "a cat");
        assert_eq!(body["status"], "queued");
        assert!(body.get("operation").is_none());
    }

    #[test]
    fn test_output_refs_order() {
        let mut g = sample(json!({}));
        g.output_url = Some("https://x/out.png".into());
        g.preview_urls = vec!["https://x/p1.png".into(), "https://x/p2.png".into()];
        assert_eq!(
            g.output_refs(),
            vec!["https://x/out.png", "https://x/p1.png", "https://x/p2.png"]
        );

        g.output_url = None;
        assert_eq!(g.output_refs().len(), 2);
    }
}
