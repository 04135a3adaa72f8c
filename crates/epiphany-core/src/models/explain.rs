use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Interpretability artifact for an image generation; newest row is current
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explain {
    pub id: Uuid,
    pub generation_id: Uuid,
    pub token_scores: Value,
    pub heatmap_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Explain {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Explain {
            id: row.get("id"),
            generation_id: row.get("generation_id"),
            token_scores: row.get("token_scores"),
            heatmap_urls: row
                .get::<Option<Vec<String>>, _>("heatmap_urls")
                .unwrap_or_default(),
            created_at: row.get("created_at"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExplain {
    pub generation_id: Uuid,
    pub token_scores: Value,
    pub heatmap_urls: Vec<String>,
}
