//! Job lifecycle coordinator
//!
//! Bridges the four job queues and the persistence store: submits work,
//! maps queue-native job states to domain statuses, resolves jobs by
//! generation id, cancels, retries and streams progress. The store is the
//! durable record; queue jobs disappear once the queue prunes them.
//!
//! Terminal generation statuses are only written by the job handlers in
//! `task_handlers`, through compare-and-set transitions on the store.

mod cancel;
mod delete;
mod explain;
mod reads;
mod status;
mod stream;
mod submit;

pub use reads::PageParams;
pub use status::QueueCountsView;
pub use stream::StreamEvent;

use epiphany_core::models::JobOptions;
use epiphany_core::{AppError, Config, UrlAllowlist};
use epiphany_db::Persistence;
use epiphany_storage::UrlSigner;
use epiphany_worker::QueueSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub generation_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted: bool,
    pub objects_deleted: usize,
}

/// One page of a newest-first listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<i64>,
}

/// Whether read paths should turn stored references into signed URLs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignOptions {
    pub signed: bool,
    /// Falls back to the signer's default TTL
    pub ttl: Option<Duration>,
}

impl SignOptions {
    pub fn signed(ttl: Option<Duration>) -> Self {
        Self { signed: true, ttl }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    persistence: Persistence,
    queues: QueueSet,
    signer: UrlSigner,
    allowlist: UrlAllowlist,
    job_options: JobOptions,
    stream_poll_interval: Duration,
}

impl Coordinator {
    pub fn new(config: &Config, persistence: Persistence, queues: QueueSet, signer: UrlSigner) -> Self {
        Self {
            persistence,
            queues,
            signer,
            allowlist: UrlAllowlist::new(config.allowed_url_prefixes.clone()),
            job_options: config.job_options(),
            stream_poll_interval: Duration::from_millis(config.stream_poll_interval_ms),
        }
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub fn allowlist(&self) -> &UrlAllowlist {
        &self.allowlist
    }

    pub fn job_options(&self) -> JobOptions {
        self.job_options
    }
}

fn queue_error(err: anyhow::Error) -> AppError {
    AppError::Queue(err.to_string())
}

fn generation_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Generation {} not found", id))
}
