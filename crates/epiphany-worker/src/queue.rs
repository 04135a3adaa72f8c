//! Job queue abstraction
//!
//! A named, durable work queue with at-least-once delivery. A job is claimed
//! by at most one consumer at a time (`active` plus a lease); a consumer that
//! dies leaves the lease to expire and the reaper puts the job back.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use epiphany_core::models::{Job, JobCounts, JobOptions, JobState, QueueName};

/// Maximum delay before a failed job is retried. Caps exponential backoff
/// so that high attempt counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_MS: u64 = 300_000;

/// Delay before the next attempt once `attempts_made` attempts have failed:
/// `base * 2^(attempts_made - 1)`, capped.
#[inline]
pub fn compute_retry_backoff_ms(base_ms: u64, attempts_made: u32) -> u64 {
    let exponent = attempts_made.saturating_sub(1).min(32);
    base_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_RETRY_BACKOFF_MS)
}

/// What `fail` did with the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Moved to `delayed`; becomes claimable after the backoff
    Retrying { delay_ms: u64 },
    /// Attempts exhausted (or retry refused); the job is `failed`
    Failed,
    /// The job was no longer active (removed by a cancel, or reaped)
    Missing,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> QueueName;

    /// Add a job. It starts `waiting`, or `delayed` when `opts.delay_ms > 0`.
    async fn add(&self, name: &str, payload: Value, opts: JobOptions) -> Result<Job>;

    async fn get(&self, id: &str) -> Result<Option<Job>>;

    /// Jobs currently in any of `states`, oldest first
    async fn jobs(&self, states: &[JobState]) -> Result<Vec<Job>>;

    /// Jobs whose payload carries `generation_id`, oldest first
    async fn jobs_for_generation(&self, generation_id: Uuid) -> Result<Vec<Job>> {
        let jobs = self.jobs(&JobState::ALL).await?;
        Ok(jobs
            .into_iter()
            .filter(|job| job.generation_id() == Some(generation_id))
            .collect())
    }

    /// Remove a job in whatever state it is in. Returns false when it was
    /// already gone. A handler still running for a removed job keeps running;
    /// its `complete`/`fail` calls become no-ops.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Advisory progress (0-100). Returns false when the job is gone.
    async fn update_progress(&self, id: &str, progress: u8) -> Result<bool>;

    /// Claim the oldest claimable job and mark it `active`
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// `active -> completed` with the handler result. Returns false when the
    /// job is no longer active.
    async fn complete(&self, id: &str, result: Value) -> Result<bool>;

    /// Record a failed attempt. With `retry` set and attempts left, the job is
    /// delayed by the exponential backoff; otherwise it becomes `failed`.
    async fn fail(&self, id: &str, reason: &str, retry: bool) -> Result<FailOutcome>;

    /// Return `active` jobs whose lease is older than `stalled_after` to
    /// `waiting`. Returns how many were redelivered.
    async fn reap_stalled(&self, stalled_after: Duration) -> Result<u64>;

    /// Delete `completed`/`failed` jobs that finished more than `older_than` ago
    async fn prune_finished(&self, older_than: Duration) -> Result<u64>;

    async fn counts(&self) -> Result<JobCounts>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_ms(1000, 1), 1000);
        assert_eq!(compute_retry_backoff_ms(1000, 2), 2000);
        assert_eq!(compute_retry_backoff_ms(1000, 3), 4000);
        assert_eq!(compute_retry_backoff_ms(1000, 9), 256_000);
        assert_eq!(compute_retry_backoff_ms(1000, 10), MAX_RETRY_BACKOFF_MS);
        assert_eq!(compute_retry_backoff_ms(1000, u32::MAX), MAX_RETRY_BACKOFF_MS);
    }

    #[test]
    fn retry_backoff_zero_attempts_uses_base() {
        assert_eq!(compute_retry_backoff_ms(500, 0), 500);
    }
}
