use super::TaskHandler;
use crate::constants::{PROGRESS_DISPATCHED, PROGRESS_DONE, PROGRESS_RESPONDED};
use crate::inference::{edit_route, image_route, video_route};
use crate::state::AppState;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use epiphany_core::models::{
    mime_from_url, AssetKind, EditOperation, EventType, Generation, GenerationStatus,
    InferenceResult, Job, NewAsset, QueueName,
};
use epiphany_core::{JobError, JobResultExt};
use epiphany_worker::ProgressReporter;
use serde_json::{json, Value};
use std::sync::Arc;

/// Runs image, video and edit jobs against their inference worker and
/// writes the outcome into the generation row
pub struct GenerationTaskHandler;

#[async_trait]
impl TaskHandler for GenerationTaskHandler {
    #[tracing::instrument(
        skip(self, job, state, progress),
        fields(queue = %job.queue, job.id = %job.id, generation.id = tracing::field::Empty)
    )]
    async fn process(
        &self,
        job: &Job,
        state: Arc<AppState>,
        progress: ProgressReporter,
    ) -> Result<Value> {
        let generation_id = job
            .generation_id()
            .ok_or_else(|| anyhow!("Job payload has no generation id"))
            .unrecoverable()?;
        tracing::Span::current().record("generation.id", tracing::field::display(generation_id));

        let persistence = state.coordinator.persistence();
        let mut generation = persistence
            .generations
            .get(generation_id)
            .await?
            .ok_or_else(|| anyhow!("Generation {} no longer exists", generation_id))
            .unrecoverable()?;

        let is_redelivery = job.attempts_made > 0;
        let skip = match generation.status {
            GenerationStatus::Canceled | GenerationStatus::Succeeded => true,
            GenerationStatus::Failed => !is_redelivery,
            GenerationStatus::Queued | GenerationStatus::Running => false,
        };
        if skip {
            tracing::warn!(status = %generation.status, "Generation already settled, skipping job");
            return Ok(json!({ "skipped": true, "status": generation.status }));
        }

        let mut expected = vec![GenerationStatus::Queued, GenerationStatus::Running];
        if is_redelivery {
            expected.push(GenerationStatus::Failed);
        }
        let started = persistence
            .generations
            .transition_status(generation_id, &expected, GenerationStatus::Running)
            .await?;
        if !started {
            tracing::warn!("Generation changed status before dispatch, skipping job");
            return Ok(json!({ "skipped": true }));
        }
        persistence
            .events
            .append(
                generation_id,
                EventType::Running,
                json!({ "jobId": job.id, "attempt": job.attempts_made + 1 }),
            )
            .await?;

        progress.report(PROGRESS_DISPATCHED).await;

        let path = Self::route(job, &generation)?;
        let result = match state.inference.infer(job.queue, &path, &job.payload).await {
            Ok(result) => result,
            Err(e) => return Err(Self::record_failure(&state, job, generation_id, e).await),
        };

        progress.report(PROGRESS_RESPONDED).await;

        let output = result.to_output();
        let written = persistence
            .generations
            .complete_success(generation_id, &output)
            .await?;
        let mut value = serde_json::to_value(&result).context("Failed to serialize result")?;
        if !written {
            tracing::warn!("Generation left running state before the result arrived, result not recorded");
            return Ok(value);
        }

        Self::record_assets(&state, job.queue, generation_id, &result).await;

        persistence
            .events
            .append(
                generation_id,
                EventType::Succeeded,
                json!({
                    "jobId": job.id,
                    "outputUrl": output.output_url,
                    "durationMs": output.duration_ms,
                }),
            )
            .await?;

        if job.queue == QueueName::GenerateImage {
            generation.status = GenerationStatus::Succeeded;
            generation.output_url = output.output_url;
            generation.preview_urls = output.preview_urls;
            match state.coordinator.enqueue_explain(&generation).await {
                Ok(explain_job) => value["explain_id"] = Value::String(explain_job.id),
                Err(e) => tracing::warn!(error = %e, "Failed to enqueue explain job"),
            }
        }

        progress.report(PROGRESS_DONE).await;
        tracing::info!("Generation succeeded");
        Ok(value)
    }
}

impl GenerationTaskHandler {
    fn route(job: &Job, generation: &Generation) -> Result<String> {
        match job.queue {
            QueueName::GenerateImage => Ok(image_route(&job.payload).to_string()),
            QueueName::GenerateVideo => Ok(video_route(&job.payload).to_string()),
            QueueName::EditImage => {
                let name = generation.operation.as_deref().unwrap_or(&job.name);
                let operation = name.parse::<EditOperation>().unrecoverable()?;
                Ok(edit_route(operation))
            }
            QueueName::Explain => {
                Err(JobError::unrecoverable(anyhow!("Explain jobs are not generations")).into())
            }
        }
    }

    /// Mark the generation failed, log a `failed` event and hand back a
    /// recoverable error so the queue applies its retry policy
    async fn record_failure(
        state: &AppState,
        job: &Job,
        generation_id: uuid::Uuid,
        error: anyhow::Error,
    ) -> anyhow::Error {
        let message = format!("{:#}", error);
        Self::settle_failed(state, job, generation_id, &message).await;
        tracing::warn!(error = %message, "Inference call failed");
        JobError::recoverable(error).into()
    }

    /// Failure path for an attempt the worker cut off at its lease timeout
    pub(crate) async fn record_timeout(state: &AppState, job: &Job, reason: &str) {
        let Some(generation_id) = job.generation_id() else {
            return;
        };
        tracing::warn!(job.id = %job.id, generation.id = %generation_id, "Inference call timed out");
        Self::settle_failed(state, job, generation_id, reason).await;
    }

    async fn settle_failed(state: &AppState, job: &Job, generation_id: uuid::Uuid, message: &str) {
        let persistence = state.coordinator.persistence();

        match persistence
            .generations
            .mark_failed(generation_id, message)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Generation left running state, failure not recorded");
                return;
            }
            Err(e) => tracing::error!(error = %e, "Failed to mark generation failed"),
        }

        if let Err(e) = persistence
            .events
            .append(
                generation_id,
                EventType::Failed,
                json!({ "jobId": job.id, "error": message, "attempt": job.attempts_made + 1 }),
            )
            .await
        {
            tracing::error!(error = %e, "Failed to append failed event");
        }
    }

    /// One asset per output object; duplicates from a redelivered job are
    /// absorbed by the store
    async fn record_assets(
        state: &AppState,
        queue: QueueName,
        generation_id: uuid::Uuid,
        result: &InferenceResult,
    ) {
        let primary_kind = if queue == QueueName::GenerateVideo {
            AssetKind::Video
        } else {
            AssetKind::Image
        };
        let objects = result
            .output_url
            .iter()
            .map(|url| (url, primary_kind))
            .chain(result.preview_urls.iter().map(|url| (url, AssetKind::Preview)));

        for (url, kind) in objects {
            let meta = result.object_meta(url);
            let new_asset = NewAsset {
                generation_id,
                url: url.clone(),
                kind,
                mime: meta
                    .and_then(|m| m.mime.clone())
                    .or_else(|| mime_from_url(url).map(String::from)),
                bytes: meta.and_then(|m| m.bytes),
                width: meta.and_then(|m| m.width),
                height: meta.and_then(|m| m.height),
                sha256: meta.and_then(|m| m.sha256.clone()),
            };
            match state
                .coordinator
                .persistence()
                .assets
                .create_if_absent(new_asset)
                .await
            {
                Ok((asset, true)) => tracing::debug!(asset.id = %asset.id, "Asset recorded"),
                Ok((_, false)) => tracing::debug!(url = %url, "Asset already recorded"),
                Err(e) => tracing::warn!(error = %e, url = %url, "Failed to record asset"),
            }
        }
    }
}
