//! Epiphany Core Library
//!
//! Domain models, the queue-state mapping table, submission validation,
//! error types and configuration shared by every Epiphany crate.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;
pub mod prompt;
pub mod storage_types;
pub mod validation;

pub use config::{Config, InferenceConfig, QueueConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::{JobError, JobResultExt};
pub use storage_types::{PersistenceBackend, StorageBackend};
pub use validation::UrlAllowlist;
