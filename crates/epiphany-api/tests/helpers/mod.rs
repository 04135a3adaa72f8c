//! Test helpers: coordinator and app state over the in-memory store and
//! queues, with recording storage and scripted inference.
//!
//! Jobs are never picked up in the background; tests drive delivery with
//! [`TestHarness::run_next`].

#![allow(dead_code)]

pub mod inference;
pub mod storage;

use axum_test::TestServer;
use epiphany_api::setup::routes;
use epiphany_api::{AppState, Coordinator};
use epiphany_core::models::{GenerateImageRequest, QueueName, Submission};
use epiphany_core::Config;
use epiphany_db::Persistence;
use epiphany_infra::{InMemoryRateLimiter, RateLimitBackend};
use epiphany_storage::UrlSigner;
use epiphany_worker::{execute_job, JobHandler, JobOutcome, QueueSet};
use std::sync::Arc;
use std::time::Duration;

use inference::ScriptedInference;
use storage::RecordingStorage;

pub const TEST_API_KEY: &str = "test-key";

/// Config for tests: retries are immediately claimable
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.queue.backoff_ms = 0;
    config.queue.max_attempts = 3;
    config.stream_poll_interval_ms = 700;
    config
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub storage: Arc<RecordingStorage>,
    pub inference: Arc<ScriptedInference>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(test_config(), RecordingStorage::new(), ScriptedInference::new())
    }

    pub fn with(config: Config, storage: RecordingStorage, inference: ScriptedInference) -> Self {
        let storage = Arc::new(storage);
        let inference = Arc::new(inference);
        let signer = UrlSigner::new(storage.clone(), Duration::from_secs(3600));
        let coordinator = Coordinator::new(
            &config,
            Persistence::in_memory(),
            QueueSet::in_memory(),
            signer,
        );
        let rate_limiter: Arc<dyn RateLimitBackend> = Arc::new(InMemoryRateLimiter::new(
            config.rate_limit_max,
            Duration::from_millis(config.rate_limit_window_ms),
        ));
        let state = Arc::new(AppState::new(
            config,
            coordinator,
            inference.clone(),
            rate_limiter,
        ));
        Self {
            state,
            storage,
            inference,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.state.coordinator
    }

    /// Claim and run the next job on `queue`. `None` when nothing is claimable.
    pub async fn run_next(&self, queue: QueueName) -> Option<JobOutcome> {
        let queue = self.coordinator().queues().get(queue).clone();
        let job = queue.claim_next().await.unwrap()?;
        let handler: Arc<dyn JobHandler> = self.state.clone();
        Some(execute_job(&queue, handler, job, Duration::from_secs(30)).await)
    }

    pub fn server(&self) -> TestServer {
        let router = routes::setup_routes(&self.state.config, self.state.clone()).unwrap();
        TestServer::new(router).unwrap()
    }
}

pub fn image_request(prompt: &str) -> GenerateImageRequest {
    serde_json::from_value(serde_json::json!({ "prompt": prompt, "mode": 0 })).unwrap()
}

pub fn image_submission(harness: &TestHarness, prompt: &str) -> Submission {
    Submission::generate_image(&image_request(prompt), harness.coordinator().allowlist()).unwrap()
}
