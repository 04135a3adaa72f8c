use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use epiphany_core::models::{Asset, NewAsset};

use super::store::AssetStore;

const ASSET_COLUMNS: &str =
    "id, generation_id, url, kind, mime, bytes, width, height, sha256, created_at";

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for AssetRepository {
    #[tracing::instrument(skip(self, new), fields(generation.id = %new.generation_id, url = %new.url))]
    async fn create_if_absent(&self, new: NewAsset) -> Result<(Asset, bool)> {
        let sql = format!(
            r#"
            INSERT INTO assets (id, generation_id, url, kind, mime, bytes, width, height, sha256)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (generation_id, url) DO NOTHING
            RETURNING {}
            "#,
            ASSET_COLUMNS
        );
        let inserted = sqlx::query_as::<Postgres, Asset>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.generation_id)
            .bind(&new.url)
            .bind(new.kind.to_string())
            .bind(new.mime.as_deref())
            .bind(new.bytes)
            .bind(new.width)
            .bind(new.height)
            .bind(new.sha256.as_deref())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to insert asset")?;

        if let Some(asset) = inserted {
            return Ok((asset, true));
        }

        let sql = format!(
            "SELECT {} FROM assets WHERE generation_id = $1 AND url = $2",
            ASSET_COLUMNS
        );
        let existing = sqlx::query_as::<Postgres, Asset>(&sql)
            .bind(new.generation_id)
            .bind(&new.url)
            .fetch_one(&self.pool)
            .await
            .context("Failed to fetch existing asset")?;
        Ok((existing, false))
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Asset>> {
        let sql = format!("SELECT {} FROM assets WHERE id = $1", ASSET_COLUMNS);
        sqlx::query_as::<Postgres, Asset>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch asset")
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>> {
        let sql = format!(
            "SELECT {} FROM assets ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            ASSET_COLUMNS
        );
        sqlx::query_as::<Postgres, Asset>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list assets")
    }

    #[tracing::instrument(skip(self))]
    async fn list_for_generation(&self, generation_id: Uuid) -> Result<Vec<Asset>> {
        let sql = format!(
            "SELECT {} FROM assets WHERE generation_id = $1 ORDER BY created_at ASC",
            ASSET_COLUMNS
        );
        sqlx::query_as::<Postgres, Asset>(&sql)
            .bind(generation_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list generation assets")
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete asset")?;
        Ok(result.rows_affected() == 1)
    }
}
