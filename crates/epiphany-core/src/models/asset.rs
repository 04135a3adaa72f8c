use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    Preview,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetKind::Image => write!(f, "image"),
            AssetKind::Video => write!(f, "video"),
            AssetKind::Preview => write!(f, "preview"),
        }
    }
}

impl FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(AssetKind::Image),
            "video" => Ok(AssetKind::Video),
            "preview" => Ok(AssetKind::Preview),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

/// A stored output object; unique per `(generation_id, url)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub generation_id: Option<Uuid>,
    pub url: String,
    pub kind: AssetKind,
    pub mime: Option<String>,
    pub bytes: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub sha256: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Asset {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Asset {
            id: row.get("id"),
            generation_id: row.get("generation_id"),
            url: row.get("url"),
            kind: row.get::<String, _>("kind").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse asset kind: {}", e).into())
            })?,
            mime: row.get("mime"),
            bytes: row.get("bytes"),
            width: row.get("width"),
            height: row.get("height"),
            sha256: row.get("sha256"),
            created_at: row.get("created_at"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub generation_id: Uuid,
    pub url: String,
    pub kind: AssetKind,
    pub mime: Option<String>,
    pub bytes: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub sha256: Option<String>,
}

/// Guess a MIME type from the object URL's extension
pub fn mime_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_url() {
        assert_eq!(mime_from_url("https://x/out.png"), Some("image/png"));
        assert_eq!(mime_from_url("https://x/out.JPG?X-Amz-Signature=abc"), Some("image/jpeg"));
        assert_eq!(mime_from_url("s3://bucket/clip.mp4"), Some("video/mp4"));
        assert_eq!(mime_from_url("https://x/noext"), None);
    }
}
