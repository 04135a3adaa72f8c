use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use epiphany_core::models::{
    Generation, GenerationOutput, GenerationStatus, NewGeneration, ACTIVE_STATUSES,
};

use super::store::GenerationStore;
use super::transaction::TransactionGuard;

const GENERATION_COLUMNS: &str = r#"
    id, kind, status, queue, operation, params, output_url, preview_urls,
    duration_ms, model_hash, safety, error, created_at, updated_at
"#;

fn status_texts(statuses: &[GenerationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}

#[derive(Clone)]
pub struct GenerationRepository {
    pool: PgPool,
}

impl GenerationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GenerationStore for GenerationRepository {
    #[tracing::instrument(skip(self, new), fields(kind = %new.kind, queue = %new.queue))]
    async fn create(&self, new: NewGeneration) -> Result<Generation> {
        let sql = format!(
            r#"
            INSERT INTO generations (id, kind, status, queue, operation, params)
            VALUES ($1, $2, 'queued', $3, $4, $5)
            RETURNING {}
            "#,
            GENERATION_COLUMNS
        );
        let generation = sqlx::query_as::<Postgres, Generation>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.kind.to_string())
            .bind(new.queue.to_string())
            .bind(new.operation)
            .bind(new.params)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert generation")?;

        tracing::debug!(generation.id = %generation.id, "Generation created");
        Ok(generation)
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Generation>> {
        let sql = format!("SELECT {} FROM generations WHERE id = $1", GENERATION_COLUMNS);
        sqlx::query_as::<Postgres, Generation>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch generation")
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Generation>> {
        let sql = format!(
            "SELECT {} FROM generations ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            GENERATION_COLUMNS
        );
        sqlx::query_as::<Postgres, Generation>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list generations")
    }

    #[tracing::instrument(skip(self, expected), fields(generation.id = %id))]
    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[GenerationStatus],
        next: GenerationStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generations
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(next.to_string())
        .bind(status_texts(expected))
        .execute(&self.pool)
        .await
        .context("Failed to update generation status")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, output), fields(generation.id = %id))]
    async fn complete_success(&self, id: Uuid, output: &GenerationOutput) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generations
            SET status = 'succeeded',
                output_url = $2,
                preview_urls = $3,
                duration_ms = $4,
                model_hash = $5,
                safety = $6,
                error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($7)
            "#,
        )
        .bind(id)
        .bind(output.output_url.as_deref())
        .bind(&output.preview_urls)
        .bind(output.duration_ms)
        .bind(output.model_hash.as_deref())
        .bind(output.safety.clone())
        .bind(status_texts(ACTIVE_STATUSES))
        .execute(&self.pool)
        .await
        .context("Failed to write generation output")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, error), fields(generation.id = %id))]
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generations
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(status_texts(ACTIVE_STATUSES))
        .execute(&self.pool)
        .await
        .context("Failed to mark generation failed")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), fields(generation.id = %id))]
    async fn delete_cascade(&self, id: Uuid) -> Result<bool> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        for table in ["assets", "explains", "events"] {
            let sql = format!("DELETE FROM {} WHERE generation_id = $1", table);
            sqlx::query(&sql)
                .bind(id)
                .execute(&mut **tx)
                .await
                .with_context(|| format!("Failed to delete {} for generation", table))?;
        }

        let deleted = sqlx::query("DELETE FROM generations WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("Failed to delete generation")?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted == 1)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}
