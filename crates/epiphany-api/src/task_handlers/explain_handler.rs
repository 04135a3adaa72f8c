use super::TaskHandler;
use crate::constants::{PROGRESS_DISPATCHED, PROGRESS_DONE, PROGRESS_RESPONDED};
use crate::state::AppState;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use epiphany_core::models::{EventType, Job, NewExplain};
use epiphany_core::JobResultExt;
use epiphany_worker::ProgressReporter;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ExplainTaskHandler;

#[async_trait]
impl TaskHandler for ExplainTaskHandler {
    #[tracing::instrument(
        skip(self, job, state, progress),
        fields(job.id = %job.id, generation.id = tracing::field::Empty)
    )]
    async fn process(
        &self,
        job: &Job,
        state: Arc<AppState>,
        progress: ProgressReporter,
    ) -> Result<Value> {
        let generation_id = job
            .generation_id()
            .ok_or_else(|| anyhow!("Explain job payload has no generation id"))
            .unrecoverable()?;
        tracing::Span::current().record("generation.id", tracing::field::display(generation_id));

        let persistence = state.coordinator.persistence();
        persistence
            .generations
            .get(generation_id)
            .await?
            .ok_or_else(|| anyhow!("Generation {} no longer exists", generation_id))
            .unrecoverable()?;

        progress.report(PROGRESS_DISPATCHED).await;
        let result = state.inference.explain(generation_id).await?;
        progress.report(PROGRESS_RESPONDED).await;

        let explain = persistence
            .explains
            .create(NewExplain {
                generation_id,
                token_scores: result.token_scores.clone().unwrap_or(Value::Null),
                heatmap_urls: result.heatmap_urls.clone(),
            })
            .await
            .context("Failed to store explain result")?;

        persistence
            .events
            .append(
                generation_id,
                EventType::ExplainSucceeded,
                json!({ "explainId": explain.id, "jobId": job.id }),
            )
            .await?;

        let mut value = serde_json::to_value(&result).context("Failed to serialize result")?;
        value["explain_id"] = Value::String(explain.id.to_string());

        progress.report(PROGRESS_DONE).await;
        tracing::info!(explain.id = %explain.id, "Explain stored");
        Ok(value)
    }
}
