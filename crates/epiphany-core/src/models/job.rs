//! Queue-native job types and the queue-state to domain-status mapping

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::generation::GenerationStatus;

/// Payload key every job carries to correlate it with its generation row
pub const GENERATION_ID_KEY: &str = "generationId";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    GenerateImage,
    GenerateVideo,
    EditImage,
    Explain,
}

impl QueueName {
    /// Fixed lookup order for cross-queue lookups
    pub const ALL: [QueueName; 4] = [
        QueueName::GenerateImage,
        QueueName::GenerateVideo,
        QueueName::EditImage,
        QueueName::Explain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::GenerateImage => "generate_image",
            QueueName::GenerateVideo => "generate_video",
            QueueName::EditImage => "edit_image",
            QueueName::Explain => "explain",
        }
    }
}

impl Display for QueueName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate_image" => Ok(QueueName::GenerateImage),
            "generate_video" => Ok(QueueName::GenerateVideo),
            "edit_image" => Ok(QueueName::EditImage),
            "explain" => Ok(QueueName::Explain),
            _ => Err(anyhow::anyhow!("Invalid queue name: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
    Paused,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Waiting,
        JobState::Delayed,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Paused,
    ];

    /// States a cancel may remove a job from
    pub const LIVE: [JobState; 3] = [JobState::Waiting, JobState::Delayed, JobState::Active];

    /// Fixed mapping from queue-native state to domain status
    pub fn domain_status(&self) -> GenerationStatus {
        match self {
            JobState::Waiting | JobState::Delayed | JobState::Paused => GenerationStatus::Queued,
            JobState::Active => GenerationStatus::Running,
            JobState::Completed => GenerationStatus::Succeeded,
            JobState::Failed => GenerationStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "paused" => Ok(JobState::Paused),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// Per-job delivery options, fixed when the job is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Base of the exponential retry delay
    pub backoff_ms: u64,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    pub delay_ms: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
            remove_on_complete: false,
            remove_on_fail: false,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Only unique within `queue`
    pub id: String,
    pub queue: QueueName,
    pub name: String,
    pub payload: Value,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<Value>,
    pub failed_reason: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Job {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let decode = |field: &str, e: anyhow::Error| {
            sqlx::Error::Decode(format!("Failed to parse {}: {}", field, e).into())
        };
        Ok(Job {
            id: row.get::<i64, _>("id").to_string(),
            queue: row
                .get::<String, _>("queue")
                .parse()
                .map_err(|e| decode("queue", e))?,
            name: row.get("name"),
            payload: row.get("payload"),
            state: row
                .get::<String, _>("state")
                .parse()
                .map_err(|e| decode("state", e))?,
            progress: row.get::<i16, _>("progress").clamp(0, 100) as u8,
            result: row.get("result"),
            failed_reason: row.get("failed_reason"),
            attempts_made: row.get::<i32, _>("attempts_made").max(0) as u32,
            max_attempts: row.get::<i32, _>("max_attempts").max(1) as u32,
            backoff_ms: row.get::<i64, _>("backoff_ms").max(0) as u64,
            remove_on_complete: row.get("remove_on_complete"),
            remove_on_fail: row.get("remove_on_fail"),
            available_at: row.get("available_at"),
            locked_at: row.get("locked_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Job {
    /// Generation id embedded in the payload, if present and well-formed
    pub fn generation_id(&self) -> Option<Uuid> {
        self.payload
            .get(GENERATION_ID_KEY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    pub fn status(&self) -> GenerationStatus {
        self.state.domain_status()
    }
}

/// Builds the `{...params, generationId}` envelope for a job payload
pub fn job_payload(params: &Value, generation_id: Uuid) -> Value {
    let mut payload = match params {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    payload.insert(
        GENERATION_ID_KEY.to_string(),
        Value::String(generation_id.to_string()),
    );
    Value::Object(payload)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: u64,
}

impl JobCounts {
    pub fn add(&mut self, state: JobState, n: u64) {
        match state {
            JobState::Waiting => self.waiting += n,
            JobState::Delayed => self.delayed += n,
            JobState::Active => self.active += n,
            JobState::Completed => self.completed += n,
            JobState::Failed => self.failed += n,
            JobState::Paused => self.paused += n,
        }
    }
}

/// Externally visible status of a queue job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub queue: QueueName,
    pub generation_id: Option<Uuid>,
    pub state: JobState,
    pub status: GenerationStatus,
    pub progress: u8,
    pub attempts_made: u32,
    pub output_url: Option<String>,
    pub preview_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub error: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let result = job.result.as_ref();
        let text = |key: &str| {
            result
                .and_then(|r| r.get(key))
                .and_then(Value::as_str)
                .map(String::from)
        };
        let preview_urls = result
            .and_then(|r| r.get("preview_urls"))
            .and_then(Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        JobView {
            id: job.id.clone(),
            queue: job.queue,
            generation_id: job.generation_id(),
            state: job.state,
            status: job.status(),
            progress: job.progress,
            attempts_made: job.attempts_made,
            output_url: text("output_url"),
            preview_urls,
            explain_id: text("explain_id"),
            caption: text("caption"),
            error: if job.state == JobState::Failed {
                job.failed_reason.clone()
            } else {
                None
            },
        }
    }
}

/// Generation-to-job lookup result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub queue_name: QueueName,
    pub job_id: String,
    pub state: JobState,
    pub status: GenerationStatus,
    pub progress: u8,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        JobRef {
            queue_name: job.queue,
            job_id: job.id.clone(),
            state: job.state,
            status: job.status(),
            progress: job.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(state: JobState, payload: Value, result: Option<Value>) -> Job {
        let now = Utc::now();
        Job {
            id: "7".to_string(),
            queue: QueueName::GenerateImage,
            name: "generate".to_string(),
            payload,
            state,
            progress: 0,
            result,
            failed_reason: Some("HTTP 500 boom".to_string()),
            attempts_made: 1,
            max_attempts: 3,
            backoff_ms: 1000,
            remove_on_complete: false,
            remove_on_fail: false,
            available_at: now,
            locked_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_state_mapping_table() {
        assert_eq!(JobState::Waiting.domain_status(), GenerationStatus::Queued);
        assert_eq!(JobState::Delayed.domain_status(), GenerationStatus::Queued);
        assert_eq!(JobState::Paused.domain_status(), GenerationStatus::Queued);
        assert_eq!(JobState::Active.domain_status(), GenerationStatus::Running);
        assert_eq!(JobState::Completed.domain_status(), GenerationStatus::Succeeded);
        assert_eq!(JobState::Failed.domain_status(), GenerationStatus::Failed);
    }

    #[test]
    fn test_queue_never_maps_to_canceled() {
        for state in JobState::ALL {
            assert_ne!(state.domain_status(), GenerationStatus::Canceled);
        }
    }

    #[test]
    fn test_live_and_terminal_are_disjoint() {
        for state in JobState::ALL {
            assert!(!(state.is_live() && state.is_terminal()), "{}", state);
        }
        assert!(!JobState::Paused.is_live());
        assert!(!JobState::Paused.is_terminal());
    }

    #[test]
    fn test_queue_lookup_order() {
        let names: Vec<&str> = QueueName::ALL.iter().map(|q| q.as_str()).collect();
        assert_eq!(
            names,
            vec!["generate_image", "generate_video", "edit_image", "explain"]
        );
    }

    #[test]
    fn test_job_payload_embeds_generation_id() {
        let id = Uuid::new_v4();
        let payload = job_payload(&json!({"prompt": "a cat", "steps": 20}), id);
        assert_eq!(payload["prompt"], "a cat");
        assert_eq!(payload[GENERATION_ID_KEY], id.to_string());

        let j = job(JobState::Waiting, payload, None);
        assert_eq!(j.generation_id(), Some(id));
    }

    #[test]
    fn test_generation_id_missing_or_malformed() {
        assert_eq!(job(JobState::Waiting, json!({}), None).generation_id(), None);
        assert_eq!(
            job(JobState::Waiting, json!({"generationId": "nope"}), None).generation_id(),
            None
        );
    }

    #[test]
    fn test_view_reads_result_fields() {
        let j = job(
            JobState::Completed,
            json!({}),
            Some(json!({
                "output_url": "https://x/out.png",
                "preview_urls": ["https://x/p.png"],
                "explain_id": "12"
            })),
        );
        let view = JobView::from(&j);
        assert_eq!(view.status, GenerationStatus::Succeeded);
        assert_eq!(view.output_url.as_deref(), Some("https://x/out.png"));
        assert_eq!(view.preview_urls, vec!["https://x/p.png".to_string()]);
        assert_eq!(view.explain_id.as_deref(), Some("12"));
        assert_eq!(view.error, None);
    }

    #[test]
    fn test_view_reports_failure_reason_only_when_failed() {
        let failed = JobView::from(&job(JobState::Failed, json!({}), None));
        assert_eq!(failed.error.as_deref(), Some("HTTP 500 boom"));

        let retrying = JobView::from(&job(JobState::Delayed, json!({}), None));
        assert_eq!(retrying.error, None);
        assert_eq!(retrying.status, GenerationStatus::Queued);
    }

    #[test]
    fn test_can_retry() {
        let mut j = job(JobState::Active, json!({}), None);
        assert!(j.can_retry());
        j.attempts_made = 3;
        assert!(!j.can_retry());
    }
}
