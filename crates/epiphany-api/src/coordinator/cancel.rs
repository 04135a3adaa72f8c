use epiphany_core::models::{
    EventType, GenerationStatus, Job, NewGeneration, QueueName, ACTIVE_STATUSES,
};
use epiphany_core::AppError;
use serde_json::json;
use uuid::Uuid;

use super::{generation_not_found, queue_error, CancelResponse, Coordinator, SubmitResponse};

impl Coordinator {
    /// Remove every live job for the generation and mark it canceled.
    ///
    /// Removal is best-effort: a job that finished between lookup and
    /// removal is skipped, and a row that already reached a terminal status
    /// is left as it is. A `failed` row whose job was still waiting on a
    /// retry is not terminal yet and is canceled too.
    #[tracing::instrument(skip(self), fields(generation.id = %generation_id))]
    pub async fn cancel(&self, generation_id: Uuid) -> Result<CancelResponse, AppError> {
        let removed_jobs = self.remove_live_jobs(generation_id).await?;
        let removed = removed_jobs.len();
        if removed == 0 {
            tracing::debug!("No live jobs to cancel");
            return Ok(CancelResponse { cancelled: false });
        }

        let mut expected = ACTIVE_STATUSES.to_vec();
        if removed_jobs.iter().any(|job| job.attempts_made > 0) {
            expected.push(GenerationStatus::Failed);
        }
        let transitioned = self
            .persistence
            .generations
            .transition_status(generation_id, &expected, GenerationStatus::Canceled)
            .await?;
        if !transitioned {
            tracing::warn!(
                removed_jobs = removed,
                "Generation already terminal, jobs removed but status left unchanged"
            );
            return Ok(CancelResponse { cancelled: false });
        }

        self.persistence
            .events
            .append(
                generation_id,
                EventType::Canceled,
                json!({ "removedJobs": removed }),
            )
            .await?;
        tracing::info!(removed_jobs = removed, "Generation canceled");

        Ok(CancelResponse { cancelled: true })
    }

    /// Remove waiting, delayed and active jobs for the generation across all
    /// queues. Returns the jobs that were actually removed.
    pub(super) async fn remove_live_jobs(&self, generation_id: Uuid) -> Result<Vec<Job>, AppError> {
        let mut removed = Vec::new();
        for queue in self.queues.iter() {
            let jobs = queue
                .jobs_for_generation(generation_id)
                .await
                .map_err(queue_error)?;
            for job in jobs.into_iter().filter(|job| job.state.is_live()) {
                match queue.remove(&job.id).await {
                    Ok(true) => removed.push(job),
                    Ok(false) => {
                        tracing::debug!(job.id = %job.id, queue = %queue.name(), "Job gone before removal")
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, job.id = %job.id, queue = %queue.name(), "Failed to remove job")
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Resubmit a generation's parameters as a brand-new generation.
    ///
    /// The source row is never touched; the new row carries a `retry` event
    /// pointing back at it.
    #[tracing::instrument(skip(self), fields(generation.id = %generation_id))]
    pub async fn retry(&self, generation_id: Uuid) -> Result<SubmitResponse, AppError> {
        let source = self
            .persistence
            .generations
            .get(generation_id)
            .await?
            .ok_or_else(|| generation_not_found(generation_id))?;

        if source.queue == QueueName::Explain {
            return Err(AppError::UnsupportedKind(format!(
                "Generation {} cannot be retried",
                generation_id
            )));
        }

        let generation = self
            .persistence
            .generations
            .create(NewGeneration {
                kind: source.kind,
                queue: source.queue,
                operation: source.operation.clone(),
                params: source.params.clone(),
            })
            .await?;

        self.persistence
            .events
            .append(
                generation.id,
                EventType::Retry,
                json!({ "sourceGenerationId": source.id }),
            )
            .await?;

        let job = self.enqueue(&generation).await?;
        tracing::info!(
            new_generation.id = %generation.id,
            job.id = %job.id,
            "Generation retried"
        );

        Ok(SubmitResponse {
            job_id: job.id,
            generation_id: generation.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epiphany_core::models::{GenerationKind, JobState, Submission};
    use epiphany_core::Config;
    use epiphany_db::Persistence;
    use epiphany_storage::{LocalStorage, UrlSigner};
    use epiphany_worker::QueueSet;
    use std::sync::Arc;
    use std::time::Duration;

    async fn coordinator(dir: &std::path::Path) -> Coordinator {
        let storage = LocalStorage::new(dir.to_path_buf(), "http://localhost/media".to_string())
            .await
            .unwrap();
        Coordinator::new(
            &Config::default(),
            Persistence::in_memory(),
            QueueSet::in_memory(),
            UrlSigner::new(Arc::new(storage), Duration::from_secs(60)),
        )
    }

    fn image_submission() -> Submission {
        Submission {
            kind: GenerationKind::Image,
            queue: QueueName::GenerateImage,
            operation: None,
            params: json!({"prompt": "a cat", "mode": 0}),
        }
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path()).await;
        let submitted = coord.submit(image_submission()).await.unwrap();

        let first = coord.cancel(submitted.generation_id).await.unwrap();
        let second = coord.cancel(submitted.generation_id).await.unwrap();
        assert!(first.cancelled);
        assert!(!second.cancelled);

        let row = coord
            .persistence()
            .generations
            .get(submitted.generation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, GenerationStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_does_not_overwrite_terminal_status() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path()).await;
        let submitted = coord.submit(image_submission()).await.unwrap();

        // Worker already wrote the terminal status but the job is still live
        coord
            .persistence()
            .generations
            .mark_failed(submitted.generation_id, "HTTP 500 boom")
            .await
            .unwrap();

        let response = coord.cancel(submitted.generation_id).await.unwrap();
        assert!(!response.cancelled);
        let row = coord
            .persistence()
            .generations
            .get(submitted.generation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, GenerationStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_unknown_generation_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path()).await;
        let err = coord.retry(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_live_jobs_skips_terminal_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path()).await;
        let submitted = coord.submit(image_submission()).await.unwrap();

        let queue = coord.queues().get(QueueName::GenerateImage);
        let claimed = queue.claim_next().await.unwrap().unwrap();
        queue.complete(&claimed.id, json!({})).await.unwrap();

        assert!(coord.remove_live_jobs(submitted.generation_id).await.unwrap().is_empty());
        let job = queue.get(&submitted.job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
    }
}
