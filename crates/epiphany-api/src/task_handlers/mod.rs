//! Queue job handlers (result ingestion)
//!
//! The worker pools call [`JobHandler::handle`] on the application state,
//! which picks the handler for the job's queue. These handlers are the only
//! writers of terminal generation status.

mod explain_handler;
mod generation_handler;

pub use explain_handler::ExplainTaskHandler;
pub use generation_handler::GenerationTaskHandler;

use anyhow::Result;
use async_trait::async_trait;
use epiphany_core::models::{Job, QueueName};
use epiphany_worker::{JobHandler, ProgressReporter};
use serde_json::Value;
use std::sync::Arc;

use crate::state::AppState;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn process(
        &self,
        job: &Job,
        state: Arc<AppState>,
        progress: ProgressReporter,
    ) -> Result<Value>;
}

#[async_trait]
impl JobHandler for AppState {
    async fn handle(self: Arc<Self>, job: &Job, progress: ProgressReporter) -> Result<Value> {
        match job.queue {
            QueueName::Explain => ExplainTaskHandler.process(job, self, progress).await,
            QueueName::GenerateImage | QueueName::GenerateVideo | QueueName::EditImage => {
                GenerationTaskHandler.process(job, self, progress).await
            }
        }
    }

    async fn on_timeout(self: Arc<Self>, job: &Job, reason: &str) {
        match job.queue {
            QueueName::Explain => {
                tracing::warn!(job.id = %job.id, reason, "Explain job timed out");
            }
            QueueName::GenerateImage | QueueName::GenerateVideo | QueueName::EditImage => {
                GenerationTaskHandler::record_timeout(&self, job, reason).await
            }
        }
    }
}
