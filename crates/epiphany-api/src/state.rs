//! Application state shared by the router and the job handlers.

use chrono::{DateTime, Utc};
use epiphany_core::Config;
use epiphany_infra::RateLimitBackend;
use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::inference::InferenceClient;

pub struct AppState {
    pub config: Config,
    pub coordinator: Coordinator,
    pub inference: Arc<dyn InferenceClient>,
    pub rate_limiter: Arc<dyn RateLimitBackend>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: Coordinator,
        inference: Arc<dyn InferenceClient>,
        rate_limiter: Arc<dyn RateLimitBackend>,
    ) -> Self {
        Self {
            config,
            coordinator,
            inference,
            rate_limiter,
            started_at: Utc::now(),
        }
    }
}
