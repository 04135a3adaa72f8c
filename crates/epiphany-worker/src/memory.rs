//! Process-local job queue
//!
//! Same delivery semantics as the PostgreSQL queue, minus durability. Job ids
//! are a per-queue counter, as they are in the database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

use epiphany_core::models::{Job, JobCounts, JobOptions, JobState, QueueName};

use crate::queue::{compute_retry_backoff_ms, FailOutcome, JobQueue};

#[derive(Default)]
struct QueueState {
    next_id: u64,
    jobs: BTreeMap<u64, Job>,
}

pub struct InMemoryJobQueue {
    name: QueueName,
    state: Mutex<QueueState>,
}

fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

fn since(duration: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    ChronoDuration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl InMemoryJobQueue {
    pub fn new(name: QueueName) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState::default()),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    fn name(&self) -> QueueName {
        self.name
    }

    async fn add(&self, name: &str, payload: Value, opts: JobOptions) -> Result<Job> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;

        let now = Utc::now();
        let (job_state, available_at) = if opts.delay_ms > 0 {
            (
                JobState::Delayed,
                now + ChronoDuration::milliseconds(opts.delay_ms as i64),
            )
        } else {
            (JobState::Waiting, now)
        };

        let job = Job {
            id: id.to_string(),
            queue: self.name,
            name: name.to_string(),
            payload,
            state: job_state,
            progress: 0,
            result: None,
            failed_reason: None,
            attempts_made: 0,
            max_attempts: opts.attempts.max(1),
            backoff_ms: opts.backoff_ms,
            remove_on_complete: opts.remove_on_complete,
            remove_on_fail: opts.remove_on_fail,
            available_at,
            locked_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(id, job.clone());

        tracing::debug!(queue = %self.name, job.id = %job.id, "Job added");
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn jobs(&self, states: &[JobState]) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| states.contains(&job.state))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        Ok(self.state.lock().await.jobs.remove(&id).is_some())
    }

    async fn update_progress(&self, id: &str, progress: u8) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) => {
                job.progress = progress.min(100);
                job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let next = state
            .jobs
            .values_mut()
            .filter(|job| {
                matches!(job.state, JobState::Waiting | JobState::Delayed)
                    && job.available_at <= now
            })
            .min_by_key(|job| job.available_at);

        Ok(next.map(|job| {
            job.state = JobState::Active;
            job.locked_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete(&self, id: &str, result: Value) -> Result<bool> {
        let Some(key) = parse_id(id) else {
            return Ok(false);
        };
        let mut state = self.state.lock().await;
        let remove = match state.jobs.get_mut(&key) {
            Some(job) if job.state == JobState::Active => {
                let now = Utc::now();
                job.state = JobState::Completed;
                job.result = Some(result);
                job.attempts_made += 1;
                job.locked_at = None;
                job.finished_at = Some(now);
                job.updated_at = now;
                job.remove_on_complete
            }
            _ => return Ok(false),
        };
        if remove {
            state.jobs.remove(&key);
        }
        Ok(true)
    }

    async fn fail(&self, id: &str, reason: &str, retry: bool) -> Result<FailOutcome> {
        let Some(key) = parse_id(id) else {
            return Ok(FailOutcome::Missing);
        };
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&key) else {
            return Ok(FailOutcome::Missing);
        };
        if job.state != JobState::Active {
            return Ok(FailOutcome::Missing);
        }

        let now = Utc::now();
        job.attempts_made += 1;
        job.failed_reason = Some(reason.to_string());
        job.locked_at = None;
        job.updated_at = now;

        if retry && job.can_retry() {
            let delay_ms = compute_retry_backoff_ms(job.backoff_ms, job.attempts_made);
            job.state = JobState::Delayed;
            job.available_at = now + ChronoDuration::milliseconds(delay_ms as i64);
            return Ok(FailOutcome::Retrying { delay_ms });
        }

        job.state = JobState::Failed;
        job.finished_at = Some(now);
        if job.remove_on_fail {
            state.jobs.remove(&key);
        }
        Ok(FailOutcome::Failed)
    }

    async fn reap_stalled(&self, stalled_after: Duration) -> Result<u64> {
        let cutoff = since(stalled_after);
        let mut state = self.state.lock().await;
        let mut reaped = 0;
        for job in state.jobs.values_mut() {
            if job.state == JobState::Active && job.locked_at.is_some_and(|at| at <= cutoff) {
                job.state = JobState::Waiting;
                job.locked_at = None;
                job.available_at = Utc::now();
                job.updated_at = Utc::now();
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn prune_finished(&self, older_than: Duration) -> Result<u64> {
        let cutoff = since(older_than);
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            !(job.state.is_terminal() && job.finished_at.is_some_and(|at| at <= cutoff))
        });
        Ok((before - state.jobs.len()) as u64)
    }

    async fn counts(&self) -> Result<JobCounts> {
        let state = self.state.lock().await;
        let mut counts = JobCounts::default();
        for job in state.jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }
}
