//! API constants

/// Versioned path prefix for every route
pub const API_PREFIX: &str = "/v1";

/// Service name reported by `/v1/version`
pub const SERVICE_NAME: &str = "epiphany";

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// JSON request bodies above this are rejected
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Key read by the storage health check; it is never written
pub const STORAGE_HEALTH_KEY: &str = "health-check-non-existent-key";

/// Upper bound for each health check, in seconds
pub const HEALTH_PROBE_TIMEOUT_SECS: u64 = 5;

/// Worker progress checkpoints
pub const PROGRESS_DISPATCHED: u8 = 10;
pub const PROGRESS_RESPONDED: u8 = 90;
pub const PROGRESS_DONE: u8 = 100;

/// Job name used for explain jobs
pub const EXPLAIN_JOB_NAME: &str = "explain";
