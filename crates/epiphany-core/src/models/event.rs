use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Enqueue,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Retry,
    ExplainEnqueue,
    ExplainSucceeded,
    ExplainRefresh,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Enqueue => "enqueue",
            EventType::Running => "running",
            EventType::Succeeded => "succeeded",
            EventType::Failed => "failed",
            EventType::Canceled => "canceled",
            EventType::Retry => "retry",
            EventType::ExplainEnqueue => "explain_enqueue",
            EventType::ExplainSucceeded => "explain_succeeded",
            EventType::ExplainRefresh => "explain_refresh",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueue" => Ok(EventType::Enqueue),
            "running" => Ok(EventType::Running),
            "succeeded" => Ok(EventType::Succeeded),
            "failed" => Ok(EventType::Failed),
            "canceled" => Ok(EventType::Canceled),
            "retry" => Ok(EventType::Retry),
            "explain_enqueue" => Ok(EventType::ExplainEnqueue),
            "explain_succeeded" => Ok(EventType::ExplainSucceeded),
            "explain_refresh" => Ok(EventType::ExplainRefresh),
            _ => Err(anyhow::anyhow!("Invalid event type: {}", s)),
        }
    }
}

/// Append-only audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub generation_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Event {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Event {
            id: row.get("id"),
            generation_id: row.get("generation_id"),
            event_type: row.get::<String, _>("type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse event type: {}", e).into())
            })?,
            payload: row.get("payload"),
            created_at: row.get("created_at"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub generation_id: Option<Uuid>,
    pub event_type: Option<EventType>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.generation_id.map_or(true, |id| id == event.generation_id)
            && self.event_type.map_or(true, |t| t == event.event_type)
    }
}
