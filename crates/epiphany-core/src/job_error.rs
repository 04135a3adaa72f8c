//! Job handler error types
//!
//! A handler failure is either retried by the queue's attempt/backoff policy
//! (recoverable) or moves the job straight to `failed` (unrecoverable).

use std::fmt;

/// Error returned from a queue job handler
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// The job fails immediately, remaining attempts are not used.
    ///
    /// Meant for payloads that can never succeed: a missing generation id,
    /// an unknown operation, or a generation row that no longer exists.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// The job is retried with exponential backoff while attempts remain.
    ///
    /// Inference timeouts and non-2xx upstream responses land here.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Plain errors are treated as transient
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Marks a `Result` error as unrecoverable for the queue
pub trait JobResultExt<T> {
    fn unrecoverable(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::unrecoverable(e.into()))
    }
}
