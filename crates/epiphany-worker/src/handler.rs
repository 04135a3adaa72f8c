//! Job handler trait
//!
//! The API implements this for its application state. The worker pool holds
//! a weak reference and calls `handle` for every claimed job.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use epiphany_core::models::Job;

use crate::queue::JobQueue;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one claimed job and return the result the queue stores.
    ///
    /// Errors are retried by the queue unless they downcast to an
    /// unrecoverable `JobError`.
    async fn handle(self: Arc<Self>, job: &Job, progress: ProgressReporter) -> Result<Value>;

    /// Called after `handle` was cut off by the lease timeout, before the
    /// queue records the failed attempt. The dropped `handle` future never
    /// ran its own failure path, so state it owns must be settled here.
    async fn on_timeout(self: Arc<Self>, _job: &Job, _reason: &str) {}
}

/// Writes advisory progress for one job. Failures are logged, never raised.
#[derive(Clone)]
pub struct ProgressReporter {
    queue: Arc<dyn JobQueue>,
    job_id: String,
}

impl ProgressReporter {
    pub fn new(queue: Arc<dyn JobQueue>, job_id: impl Into<String>) -> Self {
        Self {
            queue,
            job_id: job_id.into(),
        }
    }

    pub async fn report(&self, progress: u8) {
        match self.queue.update_progress(&self.job_id, progress).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job.id = %self.job_id, progress, "Progress for a removed job ignored")
            }
            Err(e) => {
                tracing::warn!(error = %e, job.id = %self.job_id, progress, "Failed to update job progress")
            }
        }
    }
}
