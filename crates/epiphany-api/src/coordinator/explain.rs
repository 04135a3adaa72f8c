use epiphany_core::models::{
    EventType, Explain, Generation, GenerationKind, GenerationStatus, Job, QueueName,
    GENERATION_ID_KEY,
};
use epiphany_core::AppError;
use serde_json::json;
use uuid::Uuid;

use super::{generation_not_found, queue_error, Coordinator, SignOptions, SubmitResponse};
use crate::constants::EXPLAIN_JOB_NAME;

impl Coordinator {
    /// Add an explain job for a finished image generation
    pub async fn enqueue_explain(&self, generation: &Generation) -> Result<Job, AppError> {
        self.add_explain_job(generation, EventType::ExplainEnqueue)
            .await
    }

    /// Adds the job and logs exactly one event of `event_type` for it
    #[tracing::instrument(skip(self, generation), fields(generation.id = %generation.id))]
    async fn add_explain_job(
        &self,
        generation: &Generation,
        event_type: EventType,
    ) -> Result<Job, AppError> {
        let mut payload = json!({
            "imageUrl": generation.output_url,
            "prompt": generation.prompt(),
        });
        payload[GENERATION_ID_KEY] = json!(generation.id.to_string());
        let job = self
            .queues
            .get(QueueName::Explain)
            .add(EXPLAIN_JOB_NAME, payload, self.job_options)
            .await
            .map_err(queue_error)?;

        self.persistence
            .events
            .append(generation.id, event_type, json!({ "jobId": job.id }))
            .await?;
        tracing::debug!(job.id = %job.id, event = %event_type, "Explain job enqueued");
        Ok(job)
    }

    /// Current (most recent) explain result, heatmaps signed on request
    pub async fn get_explain(&self, generation_id: Uuid, sign: SignOptions) -> Result<Explain, AppError> {
        let mut explain = self
            .persistence
            .explains
            .latest(generation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No explain result for generation {}", generation_id))
            })?;
        if sign.signed {
            explain.heatmap_urls = self.signer.sign_all(&explain.heatmap_urls, sign.ttl).await;
        }
        Ok(explain)
    }

    /// Every explain result for the generation, newest first
    pub async fn explain_history(&self, generation_id: Uuid) -> Result<Vec<Explain>, AppError> {
        Ok(self.persistence.explains.history(generation_id).await?)
    }

    #[tracing::instrument(skip(self), fields(generation.id = %generation_id))]
    pub async fn refresh_explain(&self, generation_id: Uuid) -> Result<SubmitResponse, AppError> {
        let generation = self
            .persistence
            .generations
            .get(generation_id)
            .await?
            .ok_or_else(|| generation_not_found(generation_id))?;

        if generation.kind != GenerationKind::Image {
            return Err(AppError::UnsupportedKind(format!(
                "Explain is only available for image generations, {} is {}",
                generation_id, generation.kind
            )));
        }
        if generation.status != GenerationStatus::Succeeded {
            return Err(AppError::NotFound(format!(
                "Generation {} has no finished output to explain",
                generation_id
            )));
        }

        let job = self
            .add_explain_job(&generation, EventType::ExplainRefresh)
            .await?;

        Ok(SubmitResponse {
            job_id: job.id,
            generation_id,
        })
    }
}
