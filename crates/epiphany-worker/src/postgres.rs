//! PostgreSQL-backed job queue
//!
//! All four queues share the `queue_jobs` table. Claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never take the same row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use epiphany_core::models::{Job, JobCounts, JobOptions, JobState, QueueName};
use epiphany_db::TransactionGuard;

use crate::queue::{compute_retry_backoff_ms, FailOutcome, JobQueue};

const JOB_COLUMNS: &str = r#"
    id, queue, name, payload, state, progress, result, failed_reason,
    attempts_made, max_attempts, backoff_ms, remove_on_complete, remove_on_fail,
    available_at, locked_at, finished_at, created_at, updated_at
"#;

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    name: QueueName,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, name: QueueName) -> Self {
        Self { pool, name }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    fn name(&self) -> QueueName {
        self.name
    }

    #[tracing::instrument(skip(self, payload, opts), fields(queue = %self.name))]
    async fn add(&self, name: &str, payload: Value, opts: JobOptions) -> Result<Job> {
        let state = if opts.delay_ms > 0 {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        let sql = format!(
            r#"
            INSERT INTO queue_jobs (
                queue, name, payload, state, max_attempts, backoff_ms,
                remove_on_complete, remove_on_fail, available_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW() + ($9 * INTERVAL '1 millisecond'))
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let job = sqlx::query_as::<Postgres, Job>(&sql)
            .bind(self.name.as_str())
            .bind(name)
            .bind(payload)
            .bind(state.as_str())
            .bind(opts.attempts.max(1) as i32)
            .bind(opts.backoff_ms as i64)
            .bind(opts.remove_on_complete)
            .bind(opts.remove_on_fail)
            .bind(opts.delay_ms as f64)
            .fetch_one(&self.pool)
            .await
            .context("Failed to add job")?;

        tracing::debug!(job.id = %job.id, "Job added");
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM queue_jobs WHERE queue = $1 AND id = $2",
            JOB_COLUMNS
        );
        sqlx::query_as::<Postgres, Job>(&sql)
            .bind(self.name.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch job")
    }

    async fn jobs(&self, states: &[JobState]) -> Result<Vec<Job>> {
        let states: Vec<&str> = states.iter().map(JobState::as_str).collect();
        let sql = format!(
            "SELECT {} FROM queue_jobs WHERE queue = $1 AND state = ANY($2) ORDER BY id",
            JOB_COLUMNS
        );
        sqlx::query_as::<Postgres, Job>(&sql)
            .bind(self.name.as_str())
            .bind(states)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list jobs")
    }

    /// Uses the generated `generation_id` column instead of a payload scan
    async fn jobs_for_generation(&self, generation_id: Uuid) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM queue_jobs WHERE queue = $1 AND generation_id = $2 ORDER BY id",
            JOB_COLUMNS
        );
        sqlx::query_as::<Postgres, Job>(&sql)
            .bind(self.name.as_str())
            .bind(generation_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list jobs for generation")
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM queue_jobs WHERE queue = $1 AND id = $2")
            .bind(self.name.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to remove job")?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_progress(&self, id: &str, progress: u8) -> Result<bool> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(false);
        };
        let result = sqlx::query(
            "UPDATE queue_jobs SET progress = $3, updated_at = NOW() WHERE queue = $1 AND id = $2",
        )
        .bind(self.name.as_str())
        .bind(id)
        .bind(progress.min(100) as i16)
        .execute(&self.pool)
        .await
        .context("Failed to update job progress")?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE queue_jobs
            SET state = 'active', locked_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM queue_jobs
                WHERE queue = $1
                  AND state IN ('waiting', 'delayed')
                  AND available_at <= NOW()
                ORDER BY available_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        sqlx::query_as::<Postgres, Job>(&sql)
            .bind(self.name.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to claim job")
    }

    #[tracing::instrument(skip(self, result), fields(queue = %self.name, job.id = %id))]
    async fn complete(&self, id: &str, result: Value) -> Result<bool> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(false);
        };
        let remove: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE queue_jobs
            SET state = 'completed',
                result = $3,
                attempts_made = attempts_made + 1,
                locked_at = NULL,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE queue = $1 AND id = $2 AND state = 'active'
            RETURNING remove_on_complete
            "#,
        )
        .bind(self.name.as_str())
        .bind(id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to complete job")?;

        match remove {
            None => Ok(false),
            Some(true) => {
                self.remove(&id.to_string()).await?;
                Ok(true)
            }
            Some(false) => Ok(true),
        }
    }

    #[tracing::instrument(skip(self, reason), fields(queue = %self.name, job.id = %id))]
    async fn fail(&self, id: &str, reason: &str, retry: bool) -> Result<FailOutcome> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(FailOutcome::Missing);
        };
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let sql = format!(
            "SELECT {} FROM queue_jobs WHERE queue = $1 AND id = $2 AND state = 'active' FOR UPDATE",
            JOB_COLUMNS
        );
        let Some(job) = sqlx::query_as::<Postgres, Job>(&sql)
            .bind(self.name.as_str())
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to lock job")?
        else {
            tx.rollback().await?;
            return Ok(FailOutcome::Missing);
        };

        let attempts_made = job.attempts_made + 1;
        let outcome = if retry && attempts_made < job.max_attempts {
            let delay_ms = compute_retry_backoff_ms(job.backoff_ms, attempts_made);
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET state = 'delayed',
                    attempts_made = $2,
                    failed_reason = $3,
                    locked_at = NULL,
                    available_at = NOW() + ($4 * INTERVAL '1 millisecond'),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(attempts_made as i32)
            .bind(reason)
            .bind(delay_ms as f64)
            .execute(&mut **tx)
            .await
            .context("Failed to schedule job retry")?;
            FailOutcome::Retrying { delay_ms }
        } else if job.remove_on_fail {
            sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await
                .context("Failed to remove failed job")?;
            FailOutcome::Failed
        } else {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET state = 'failed',
                    attempts_made = $2,
                    failed_reason = $3,
                    locked_at = NULL,
                    finished_at = NOW(),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(attempts_made as i32)
            .bind(reason)
            .execute(&mut **tx)
            .await
            .context("Failed to mark job failed")?;
            FailOutcome::Failed
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn reap_stalled(&self, stalled_after: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'waiting', locked_at = NULL, available_at = NOW(), updated_at = NOW()
            WHERE queue = $1
              AND state = 'active'
              AND locked_at <= NOW() - ($2 * INTERVAL '1 millisecond')
            "#,
        )
        .bind(self.name.as_str())
        .bind(millis(stalled_after) as f64)
        .execute(&self.pool)
        .await
        .context("Failed to reap stalled jobs")?;
        Ok(result.rows_affected())
    }

    async fn prune_finished(&self, older_than: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_jobs
            WHERE queue = $1
              AND state IN ('completed', 'failed')
              AND finished_at <= NOW() - ($2 * INTERVAL '1 millisecond')
            "#,
        )
        .bind(self.name.as_str())
        .bind(millis(older_than) as f64)
        .execute(&self.pool)
        .await
        .context("Failed to prune finished jobs")?;
        Ok(result.rows_affected())
    }

    async fn counts(&self) -> Result<JobCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM queue_jobs WHERE queue = $1 GROUP BY state",
        )
        .bind(self.name.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to count jobs")?;

        let mut counts = JobCounts::default();
        for (state, n) in rows {
            let state: JobState = state.parse()?;
            counts.add(state, n.max(0) as u64);
        }
        Ok(counts)
    }
}
