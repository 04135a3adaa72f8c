//! Epiphany job queues
//!
//! Four named queues (image, video, edit, explain) with at-least-once
//! delivery, bounded attempts with exponential backoff, advisory progress and
//! stored results. Backed by PostgreSQL or kept in process memory.

pub mod handler;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod queue;
pub mod set;

pub use epiphany_core::models::{Job, JobCounts, JobOptions, JobState, QueueName};
pub use handler::{JobHandler, ProgressReporter};
pub use memory::InMemoryJobQueue;
pub use pool::{execute_job, JobOutcome, WorkerConfig, WorkerPool};
pub use postgres::PgJobQueue;
pub use queue::{compute_retry_backoff_ms, FailOutcome, JobQueue, MAX_RETRY_BACKOFF_MS};
pub use set::QueueSet;
