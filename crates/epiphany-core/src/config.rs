//! Configuration module
//!
//! Everything is read from the environment (after `.env` via dotenvy). Every
//! key has a default except `DATABASE_URL`, which the postgres backend needs.

use std::env;
use std::str::FromStr;

use crate::models::job::{JobOptions, QueueName};
use crate::storage_types::{PersistenceBackend, StorageBackend};

const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const SIGNED_URL_TTL_SECS: u64 = 3600;
const RATE_LIMIT_MAX: u32 = 120;
const RATE_LIMIT_WINDOW_MS: u64 = 60_000;
const INFERENCE_TIMEOUT_SECS: u64 = 600;
const QUEUE_CONCURRENCY: usize = 2;
const QUEUE_POLL_INTERVAL_MS: u64 = 500;
const QUEUE_MAX_ATTEMPTS: u32 = 3;
const QUEUE_BACKOFF_MS: u64 = 1000;
const QUEUE_RETENTION_SECS: u64 = 3600;
const QUEUE_STALLED_AFTER_SECS: u64 = 900;
const QUEUE_REAP_INTERVAL_SECS: u64 = 30;
const STREAM_POLL_INTERVAL_MS: u64 = 700;

/// Base URLs of the external inference workers, one per capability
#[derive(Clone, Debug)]
pub struct InferenceConfig {
    pub image_url: String,
    pub video_url: String,
    pub edit_url: String,
    pub explain_url: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            image_url: "http://localhost:8001".to_string(),
            video_url: "http://localhost:8002".to_string(),
            edit_url: "http://localhost:8003".to_string(),
            explain_url: "http://localhost:8004".to_string(),
            timeout_secs: INFERENCE_TIMEOUT_SECS,
        }
    }
}

/// Worker pool and retention settings, shared by all four queues
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    /// Age after which retained completed/failed jobs are pruned. 0 = keep forever.
    pub retention_secs: u64,
    /// Lease length after which an active job is handed out again.
    pub stalled_after_secs: u64,
    pub reap_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: QUEUE_CONCURRENCY,
            poll_interval_ms: QUEUE_POLL_INTERVAL_MS,
            max_attempts: QUEUE_MAX_ATTEMPTS,
            backoff_ms: QUEUE_BACKOFF_MS,
            remove_on_complete: false,
            remove_on_fail: false,
            retention_secs: QUEUE_RETENTION_SECS,
            stalled_after_secs: QUEUE_STALLED_AFTER_SECS,
            reap_interval_secs: QUEUE_REAP_INTERVAL_SECS,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub log_json: bool,
    pub backend: PersistenceBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // MinIO and other S3-compatible providers
    pub s3_inputs_bucket: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub signed_url_ttl_secs: u64,
    pub api_key: Option<String>,
    pub web_origin: Option<String>,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    /// Input image URLs must start with one of these when non-empty
    pub allowed_url_prefixes: Vec<String>,
    pub inference: InferenceConfig,
    pub queue: QueueConfig,
    pub stream_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            log_json: false,
            backend: PersistenceBackend::Postgres,
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            s3_inputs_bucket: None,
            local_storage_path: None,
            local_storage_base_url: None,
            signed_url_ttl_secs: SIGNED_URL_TTL_SECS,
            api_key: None,
            web_origin: None,
            rate_limit_max: RATE_LIMIT_MAX,
            rate_limit_window_ms: RATE_LIMIT_WINDOW_MS,
            allowed_url_prefixes: Vec::new(),
            inference: InferenceConfig::default(),
            queue: QueueConfig::default(),
            stream_poll_interval_ms: STREAM_POLL_INTERVAL_MS,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let backend = match env_opt("BACKEND") {
            Some(value) => value.parse()?,
            None => PersistenceBackend::Postgres,
        };
        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::S3,
        };

        let allowed_url_prefixes = env::var("ALLOWED_URL_PREFIXES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = InferenceConfig::default();
        let inference = InferenceConfig {
            image_url: env_opt("INFER_IMAGE_URL").unwrap_or(defaults.image_url),
            video_url: env_opt("INFER_VIDEO_URL").unwrap_or(defaults.video_url),
            edit_url: env_opt("EDIT_URL").unwrap_or(defaults.edit_url),
            explain_url: env_opt("EXPLAIN_URL").unwrap_or(defaults.explain_url),
            timeout_secs: env_parse("INFERENCE_TIMEOUT_SECS", INFERENCE_TIMEOUT_SECS),
        };

        let queue = QueueConfig {
            concurrency: env_parse("QUEUE_CONCURRENCY", QUEUE_CONCURRENCY),
            poll_interval_ms: env_parse("QUEUE_POLL_INTERVAL_MS", QUEUE_POLL_INTERVAL_MS),
            max_attempts: env_parse("QUEUE_MAX_ATTEMPTS", QUEUE_MAX_ATTEMPTS),
            backoff_ms: env_parse("QUEUE_BACKOFF_MS", QUEUE_BACKOFF_MS),
            remove_on_complete: env_parse("QUEUE_REMOVE_ON_COMPLETE", false),
            remove_on_fail: env_parse("QUEUE_REMOVE_ON_FAIL", false),
            retention_secs: env_parse("QUEUE_RETENTION_SECS", QUEUE_RETENTION_SECS),
            stalled_after_secs: env_parse("QUEUE_STALLED_AFTER_SECS", QUEUE_STALLED_AFTER_SECS),
            reap_interval_secs: env_parse("QUEUE_REAP_INTERVAL_SECS", QUEUE_REAP_INTERVAL_SECS),
        };

        let config = Config {
            server_port: env::var("API_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid number"))?,
            environment,
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            backend,
            database_url: env_opt("DATABASE_URL"),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            storage_backend,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION").or_else(|| env_opt("AWS_REGION")),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            s3_inputs_bucket: env_opt("S3_INPUTS_BUCKET"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_opt("LOCAL_STORAGE_BASE_URL"),
            signed_url_ttl_secs: env_parse("SIGNED_URL_TTL_SECS", SIGNED_URL_TTL_SECS),
            api_key: env_opt("API_KEY"),
            web_origin: env_opt("WEB_ORIGIN"),
            rate_limit_max: env_parse("RATE_LIMIT_MAX", RATE_LIMIT_MAX),
            rate_limit_window_ms: env_parse("RATE_LIMIT_WINDOW_MS", RATE_LIMIT_WINDOW_MS),
            allowed_url_prefixes,
            inference,
            queue,
            stream_poll_interval_ms: env_parse("STREAM_POLL_INTERVAL_MS", STREAM_POLL_INTERVAL_MS),
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.queue.concurrency == 0 {
            return Err(anyhow::anyhow!("QUEUE_CONCURRENCY must be at least 1"));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("QUEUE_POLL_INTERVAL_MS must be greater than 0"));
        }
        if self.stream_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("STREAM_POLL_INTERVAL_MS must be greater than 0"));
        }
        if self.queue.max_attempts < 1 {
            return Err(anyhow::anyhow!("QUEUE_MAX_ATTEMPTS must be at least 1"));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(anyhow::anyhow!("RATE_LIMIT_WINDOW_MS must be greater than 0"));
        }
        if self.inference.timeout_secs >= self.queue.stalled_after_secs {
            return Err(anyhow::anyhow!(
                "INFERENCE_TIMEOUT_SECS must be shorter than QUEUE_STALLED_AFTER_SECS"
            ));
        }

        if self.backend == PersistenceBackend::Postgres {
            match self.database_url.as_deref() {
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when BACKEND=postgres"
                    ))
                }
                Some(url) if !url.starts_with("postgres://") && !url.starts_with("postgresql://") => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                Some(_) => {}
            }
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Default options for newly added jobs
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            attempts: self.queue.max_attempts,
            backoff_ms: self.queue.backoff_ms,
            remove_on_complete: self.queue.remove_on_complete,
            remove_on_fail: self.queue.remove_on_fail,
            delay_ms: 0,
        }
    }

    /// Base URL of the inference worker that serves a queue
    pub fn inference_base(&self, queue: QueueName) -> &str {
        match queue {
            QueueName::GenerateImage => &self.inference.image_url,
            QueueName::GenerateVideo => &self.inference.video_url,
            QueueName::EditImage => &self.inference.edit_url,
            QueueName::Explain => &self.inference.explain_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_local() -> Config {
        Config {
            backend: PersistenceBackend::Memory,
            storage_backend: StorageBackend::Local,
            local_storage_path: Some("/tmp/epiphany".to_string()),
            local_storage_base_url: Some("http://localhost:4000/files".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_memory_local_config_is_valid() {
        assert!(memory_local().validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let config = Config {
            backend: PersistenceBackend::Postgres,
            ..memory_local()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = Config {
            backend: PersistenceBackend::Postgres,
            database_url: Some("mysql://nope".to_string()),
            ..memory_local()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency_and_attempts() {
        let mut config = memory_local();
        config.queue.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = memory_local();
        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inference_timeout_must_fit_the_lease() {
        let mut config = memory_local();
        config.inference.timeout_secs = config.queue.stalled_after_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INFERENCE_TIMEOUT_SECS"));

        config.inference.timeout_secs = config.queue.stalled_after_secs - 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_requires_bucket_and_region() {
        let config = Config {
            storage_backend: StorageBackend::S3,
            ..memory_local()
        };
        assert!(config.validate().is_err());

        let config = Config {
            storage_backend: StorageBackend::S3,
            s3_bucket: Some("outputs".to_string()),
            s3_region: Some("us-east-1".to_string()),
            ..memory_local()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_options_follow_queue_config() {
        let mut config = memory_local();
        config.queue.max_attempts = 5;
        config.queue.remove_on_complete = true;
        let opts = config.job_options();
        assert_eq!(opts.attempts, 5);
        assert!(opts.remove_on_complete);
        assert!(!opts.remove_on_fail);
        assert_eq!(opts.delay_ms, 0);
    }

    #[test]
    fn test_inference_base_per_queue() {
        let config = Config::default();
        assert_eq!(config.inference_base(QueueName::GenerateImage), "http://localhost:8001");
        assert_eq!(config.inference_base(QueueName::Explain), "http://localhost:8004");
    }

    #[test]
    fn test_is_production() {
        let mut config = Config::default();
        assert!(!config.is_production());
        config.environment = "PROD".to_string();
        assert!(config.is_production());
    }
}
