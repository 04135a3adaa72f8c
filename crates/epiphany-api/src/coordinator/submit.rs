use epiphany_core::models::{
    job_payload, EventType, Generation, Job, NewGeneration, Submission, GENERATE_JOB_NAME,
};
use epiphany_core::AppError;
use serde_json::json;

use super::{queue_error, Coordinator, SubmitResponse};

impl Coordinator {
    /// Create a queued generation row, record the enqueue and add the job.
    ///
    /// The row is written before the job is added; if the queue rejects the
    /// job the row stays `queued` and the caller gets a queue error.
    #[tracing::instrument(skip(self, submission), fields(queue = %submission.queue, generation.id))]
    pub async fn submit(&self, submission: Submission) -> Result<SubmitResponse, AppError> {
        let generation = self
            .persistence
            .generations
            .create(NewGeneration {
                kind: submission.kind,
                queue: submission.queue,
                operation: submission.operation.map(|op| op.as_str().to_string()),
                params: submission.params,
            })
            .await?;
        tracing::Span::current().record("generation.id", tracing::field::display(generation.id));

        let job = self.enqueue(&generation).await?;
        tracing::info!(job.id = %job.id, "Generation submitted");

        Ok(SubmitResponse {
            job_id: job.id,
            generation_id: generation.id,
        })
    }

    /// Append the `enqueue` event and add a job for an existing row
    pub(super) async fn enqueue(&self, generation: &Generation) -> Result<Job, AppError> {
        self.persistence
            .events
            .append(
                generation.id,
                EventType::Enqueue,
                json!({
                    "queue": generation.queue,
                    "operation": generation.operation,
                }),
            )
            .await?;

        let name = generation.operation.as_deref().unwrap_or(GENERATE_JOB_NAME);
        self.queues
            .get(generation.queue)
            .add(
                name,
                job_payload(&generation.params, generation.id),
                self.job_options,
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    generation.id = %generation.id,
                    "Failed to enqueue job; generation stays queued"
                );
                queue_error(e)
            })
    }
}
