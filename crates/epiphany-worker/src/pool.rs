//! Per-queue worker pool: polling claim loop, retry policy and the reaper.
//!
//! Shutdown: [`WorkerPool::shutdown`] stops claiming new jobs; it does not
//! wait for in-flight handlers. Jobs abandoned by a killed process are
//! redelivered once their lease exceeds `stalled_after`.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use epiphany_core::models::Job;
use epiphany_core::{JobError, QueueConfig};

use crate::handler::{JobHandler, ProgressReporter};
use crate::queue::{FailOutcome, JobQueue};
use crate::set::QueueSet;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Lease length. A handler running longer is abandoned and the job
    /// becomes eligible for redelivery.
    pub stalled_after: Duration,
    /// Interval between reaper runs; zero disables the reaper
    pub reap_interval: Duration,
    /// Age after which retained completed/failed jobs are pruned
    pub retention: Duration,
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stalled_after: Duration::from_secs(config.stalled_after_secs),
            reap_interval: Duration::from_secs(config.reap_interval_secs),
            retention: Duration::from_secs(config.retention_secs),
        }
    }
}

/// How one delivery of a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retrying { delay_ms: u64 },
    Failed,
    /// The job left the queue while its handler ran (canceled or reaped);
    /// the handler's result was dropped
    Discarded,
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerPool {
    /// Spawn the claim loop and the reaper for `queue`
    pub fn start(
        queue: Arc<dyn JobQueue>,
        config: WorkerConfig,
        handler: Weak<dyn JobHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let pool_queue = queue.clone();
        tokio::spawn(async move {
            Self::worker_pool(pool_queue, config, handler, shutdown_rx).await;
        });

        Self { queue, shutdown_tx }
    }

    /// One pool per queue, sharing the handler
    pub fn start_all(
        queues: &QueueSet,
        config: &WorkerConfig,
        handler: Weak<dyn JobHandler>,
    ) -> Vec<WorkerPool> {
        queues
            .iter()
            .map(|queue| Self::start(queue.clone(), config.clone(), handler.clone()))
            .collect()
    }

    async fn worker_pool(
        queue: Arc<dyn JobQueue>,
        config: WorkerConfig,
        handler: Weak<dyn JobHandler>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let queue_name = queue.name();
        tracing::info!(
            queue = %queue_name,
            concurrency = config.concurrency,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        let (reaper_shutdown_tx, reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if !config.reap_interval.is_zero() {
            tokio::spawn(Self::reaper(queue.clone(), config.clone(), reaper_shutdown_rx));
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(queue = %queue_name, "Worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = sleep(config.poll_interval) => {
                    Self::claim_and_dispatch(&queue, &semaphore, &handler, config.stalled_after).await;
                }
            }
        }

        tracing::info!(queue = %queue_name, "Worker pool stopped");
    }

    /// Claim jobs until the queue is empty or every permit is taken
    async fn claim_and_dispatch(
        queue: &Arc<dyn JobQueue>,
        semaphore: &Arc<Semaphore>,
        handler: &Weak<dyn JobHandler>,
        timeout: Duration,
    ) {
        loop {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::trace!(queue = %queue.name(), "No workers available, skipping claim");
                    return;
                }
            };

            let Some(handler) = handler.upgrade() else {
                tracing::error!(queue = %queue.name(), "Job handler was dropped, cannot process jobs");
                return;
            };

            match queue.claim_next().await {
                Ok(Some(job)) => {
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        execute_job(&queue, handler, job, timeout).await;
                    });
                }
                Ok(None) => {
                    tracing::trace!(queue = %queue.name(), "No jobs available in queue");
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, queue = %queue.name(), "Failed to claim job from queue");
                    return;
                }
            }
        }
    }

    async fn reaper(
        queue: Arc<dyn JobQueue>,
        config: WorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(config.reap_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match queue.reap_stalled(config.stalled_after).await {
                        Ok(0) => {}
                        Ok(n) => tracing::warn!(queue = %queue.name(), count = n, "Redelivering stalled jobs"),
                        Err(e) => tracing::error!(error = %e, queue = %queue.name(), "Stalled job reaper failed"),
                    }
                    match queue.prune_finished(config.retention).await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(queue = %queue.name(), count = n, "Pruned finished jobs"),
                        Err(e) => tracing::error!(error = %e, queue = %queue.name(), "Finished job pruning failed"),
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Stop claiming new jobs. Returns immediately; in-flight handlers keep
    /// running until they finish or hit the lease timeout.
    pub async fn shutdown(&self) {
        tracing::info!(queue = %self.queue.name(), "Initiating worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Run the handler for one claimed job and record the outcome on the queue.
///
/// Recoverable errors and timeouts use the job's remaining attempts;
/// unrecoverable `JobError`s fail the job at once.
#[tracing::instrument(skip(queue, handler, job), fields(queue = %job.queue, job.id = %job.id, job.name = %job.name))]
pub async fn execute_job(
    queue: &Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    job: Job,
    timeout: Duration,
) -> JobOutcome {
    let progress = ProgressReporter::new(queue.clone(), job.id.clone());
    let result = tokio::time::timeout(timeout, handler.clone().handle(&job, progress)).await;

    let (reason, retry) = match result {
        Ok(Ok(value)) => {
            return match queue.complete(&job.id, value).await {
                Ok(true) => {
                    tracing::info!("Job completed successfully");
                    JobOutcome::Completed
                }
                Ok(false) => {
                    tracing::warn!("Job left the queue before completing, result dropped");
                    JobOutcome::Discarded
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to mark job as completed");
                    JobOutcome::Discarded
                }
            };
        }
        Ok(Err(e)) => {
            let is_unrecoverable = e
                .downcast_ref::<JobError>()
                .map(|je| !je.is_recoverable())
                .unwrap_or(false);

            tracing::error!(
                error = %e,
                attempts_made = job.attempts_made,
                max_attempts = job.max_attempts,
                unrecoverable = is_unrecoverable,
                "Job execution failed"
            );
            (e.to_string(), !is_unrecoverable)
        }
        Err(_) => {
            tracing::error!(timeout_secs = timeout.as_secs(), "Job execution timed out");
            let reason = format!("Job execution timed out after {}s", timeout.as_secs());
            handler.on_timeout(&job, &reason).await;
            (reason, true)
        }
    };

    match queue.fail(&job.id, &reason, retry).await {
        Ok(FailOutcome::Retrying { delay_ms }) => {
            tracing::info!(
                attempts_made = job.attempts_made + 1,
                delay_ms,
                "Scheduling job retry"
            );
            JobOutcome::Retrying { delay_ms }
        }
        Ok(FailOutcome::Failed) => {
            tracing::error!("Job failed, no attempts left");
            JobOutcome::Failed
        }
        Ok(FailOutcome::Missing) => JobOutcome::Discarded,
        Err(e) => {
            tracing::error!(error = %e, "Failed to record job failure");
            JobOutcome::Discarded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryJobQueue;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use epiphany_core::models::{JobOptions, JobState, QueueName};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed,
        FailRecoverable,
        FailUnrecoverable,
        Hang,
    }

    struct TestHandler {
        behaviour: Behaviour,
        calls: AtomicUsize,
        timeouts: AtomicUsize,
    }

    impl TestHandler {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
                timeouts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobHandler for TestHandler {
        async fn handle(self: Arc<Self>, job: &Job, progress: ProgressReporter) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.report(50).await;
            match self.behaviour {
                Behaviour::Succeed => Ok(json!({"echo": job.payload})),
                Behaviour::FailRecoverable => Err(anyhow!("HTTP 503 busy")),
                Behaviour::FailUnrecoverable => {
                    Err(JobError::unrecoverable(anyhow!("missing generationId")).into())
                }
                Behaviour::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
            }
        }

        async fn on_timeout(self: Arc<Self>, _job: &Job, _reason: &str) {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn claimed(queue: &Arc<dyn JobQueue>, attempts: u32) -> Job {
        let opts = JobOptions {
            attempts,
            backoff_ms: 0,
            ..JobOptions::default()
        };
        queue.add("generate", json!({"n": 1}), opts).await.unwrap();
        queue.claim_next().await.unwrap().unwrap()
    }

    fn queue() -> Arc<dyn JobQueue> {
        Arc::new(InMemoryJobQueue::new(QueueName::GenerateImage))
    }

    #[tokio::test]
    async fn test_success_completes_job_with_result() {
        let queue = queue();
        let job = claimed(&queue, 3).await;
        let handler = TestHandler::new(Behaviour::Succeed);

        let outcome = execute_job(&queue, handler, job.clone(), Duration::from_secs(5)).await;

        assert_eq!(outcome, JobOutcome::Completed);
        let stored = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Completed);
        assert_eq!(stored.progress, 50);
        assert_eq!(stored.result, Some(json!({"echo": {"n": 1}})));
    }

    #[tokio::test]
    async fn test_recoverable_error_is_retried() {
        let queue = queue();
        let job = claimed(&queue, 3).await;
        let handler = TestHandler::new(Behaviour::FailRecoverable);

        let outcome = execute_job(&queue, handler, job.clone(), Duration::from_secs(5)).await;

        assert_eq!(outcome, JobOutcome::Retrying { delay_ms: 0 });
        let stored = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Delayed);
        assert_eq!(stored.failed_reason.as_deref(), Some("HTTP 503 busy"));
    }

    #[tokio::test]
    async fn test_unrecoverable_error_skips_retries() {
        let queue = queue();
        let job = claimed(&queue, 3).await;
        let handler = TestHandler::new(Behaviour::FailUnrecoverable);

        let outcome = execute_job(&queue, handler, job.clone(), Duration::from_secs(5)).await;

        assert_eq!(outcome, JobOutcome::Failed);
        let stored = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.attempts_made, 1);
        assert_eq!(stored.failed_reason.as_deref(), Some("missing generationId"));
    }

    #[tokio::test]
    async fn test_last_attempt_fails_job() {
        let queue = queue();
        let job = claimed(&queue, 1).await;
        let handler = TestHandler::new(Behaviour::FailRecoverable);

        let outcome = execute_job(&queue, handler, job, Duration::from_secs(5)).await;
        assert_eq!(outcome, JobOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let queue = queue();
        let job = claimed(&queue, 1).await;
        let handler = TestHandler::new(Behaviour::Hang);

        let outcome =
            execute_job(&queue, handler.clone(), job.clone(), Duration::from_secs(600)).await;

        assert_eq!(outcome, JobOutcome::Failed);
        assert_eq!(handler.timeouts.load(Ordering::SeqCst), 1);
        let stored = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(
            stored.failed_reason.as_deref(),
            Some("Job execution timed out after 600s")
        );
    }

    #[tokio::test]
    async fn test_removed_job_result_is_discarded() {
        let queue = queue();
        let job = claimed(&queue, 3).await;
        queue.remove(&job.id).await.unwrap();
        let handler = TestHandler::new(Behaviour::Succeed);

        let outcome = execute_job(&queue, handler, job, Duration::from_secs(5)).await;
        assert_eq!(outcome, JobOutcome::Discarded);
    }

    #[tokio::test]
    async fn test_pool_processes_queued_jobs() {
        let queue = queue();
        let handler = TestHandler::new(Behaviour::Succeed);
        let dyn_handler: Arc<dyn JobHandler> = handler.clone();
        let config = WorkerConfig {
            concurrency: 2,
            poll_interval: Duration::from_millis(10),
            stalled_after: Duration::from_secs(60),
            reap_interval: Duration::ZERO,
            retention: Duration::from_secs(3600),
        };

        for n in 0..3 {
            queue
                .add("generate", json!({"n": n}), JobOptions::default())
                .await
                .unwrap();
        }
        let pool = WorkerPool::start(queue.clone(), config, Arc::downgrade(&dyn_handler));

        for _ in 0..200 {
            if queue.counts().await.unwrap().completed == 3 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown().await;

        assert_eq!(queue.counts().await.unwrap().completed, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }
}
