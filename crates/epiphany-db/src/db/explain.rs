use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use epiphany_core::models::{Explain, NewExplain};

use super::store::ExplainStore;

#[derive(Clone)]
pub struct ExplainRepository {
    pool: PgPool,
}

impl ExplainRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExplainStore for ExplainRepository {
    #[tracing::instrument(skip(self, new), fields(generation.id = %new.generation_id))]
    async fn create(&self, new: NewExplain) -> Result<Explain> {
        sqlx::query_as::<Postgres, Explain>(
            r#"
            INSERT INTO explains (id, generation_id, token_scores, heatmap_urls)
            VALUES ($1, $2, $3, $4)
            RETURNING id, generation_id, token_scores, heatmap_urls, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.generation_id)
        .bind(new.token_scores)
        .bind(&new.heatmap_urls)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert explain")
    }

    #[tracing::instrument(skip(self))]
    async fn latest(&self, generation_id: Uuid) -> Result<Option<Explain>> {
        sqlx::query_as::<Postgres, Explain>(
            r#"
            SELECT id, generation_id, token_scores, heatmap_urls, created_at
            FROM explains
            WHERE generation_id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(generation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch explain")
    }

    #[tracing::instrument(skip(self))]
    async fn history(&self, generation_id: Uuid) -> Result<Vec<Explain>> {
        sqlx::query_as::<Postgres, Explain>(
            r#"
            SELECT id, generation_id, token_scores, heatmap_urls, created_at
            FROM explains
            WHERE generation_id = $1
            ORDER BY seq DESC
            "#,
        )
        .bind(generation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list explain history")
    }
}
