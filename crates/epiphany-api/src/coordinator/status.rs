use epiphany_core::models::{Job, JobCounts, JobRef, JobState, JobView, QueueName};
use epiphany_core::AppError;
use serde::Serialize;
use uuid::Uuid;

use super::{queue_error, Coordinator, SignOptions};

/// Per-queue job counts for the queues page
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueCountsView {
    pub name: QueueName,
    #[serde(flatten)]
    pub counts: JobCounts,
}

impl Coordinator {
    /// First queue in lookup order holding a job with this id
    pub async fn find_job(&self, job_id: &str) -> Result<Option<Job>, AppError> {
        for queue in self.queues.iter() {
            if let Some(job) = queue.get(job_id).await.map_err(queue_error)? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self, sign), fields(job.id = %job_id))]
    pub async fn get_status(&self, job_id: &str, sign: SignOptions) -> Result<JobView, AppError> {
        let job = self
            .find_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        let mut view = JobView::from(&job);
        if sign.signed {
            view.output_url = self
                .signer
                .sign_opt(view.output_url.as_deref(), sign.ttl)
                .await;
            view.preview_urls = self.signer.sign_all(&view.preview_urls, sign.ttl).await;
        }
        Ok(view)
    }

    /// Job currently carrying `generation_id`.
    ///
    /// A live job wins over any terminal one, probing queues in order; with
    /// no live job the most recently updated terminal job is returned.
    #[tracing::instrument(skip(self), fields(generation.id = %generation_id))]
    pub async fn get_by_generation(&self, generation_id: Uuid) -> Result<JobRef, AppError> {
        let mut latest_terminal: Option<Job> = None;

        for queue in self.queues.iter() {
            let jobs = queue
                .jobs_for_generation(generation_id)
                .await
                .map_err(queue_error)?;
            for job in jobs {
                if job.state.is_live() || job.state == JobState::Paused {
                    return Ok(JobRef::from(&job));
                }
                let newer = latest_terminal
                    .as_ref()
                    .is_none_or(|current| job.updated_at > current.updated_at);
                if newer {
                    latest_terminal = Some(job);
                }
            }
        }

        latest_terminal
            .as_ref()
            .map(JobRef::from)
            .ok_or_else(|| {
                AppError::NotFound(format!("No job found for generation {}", generation_id))
            })
    }

    pub async fn queue_counts(&self) -> Result<Vec<QueueCountsView>, AppError> {
        let mut views = Vec::with_capacity(QueueName::ALL.len());
        for queue in self.queues.iter() {
            views.push(QueueCountsView {
                name: queue.name(),
                counts: queue.counts().await.map_err(queue_error)?,
            });
        }
        Ok(views)
    }
}
