//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod workers;

use crate::coordinator::Coordinator;
use crate::inference::HttpInferenceClient;
use crate::state::AppState;
use anyhow::{Context, Result};
use epiphany_core::{Config, PersistenceBackend};
use epiphany_db::Persistence;
use epiphany_infra::InMemoryRateLimiter;
use epiphany_storage::{create_storage, UrlSigner};
use epiphany_worker::{QueueSet, WorkerPool};
use std::sync::Arc;
use std::time::Duration;

/// Wire the store, queues, storage, inference client and router, then start
/// the worker pools. Keep the returned pools alive for the server's lifetime.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router, Vec<WorkerPool>)> {
    config.validate().context("Configuration validation failed")?;
    tracing::info!(backend = %config.backend, "Configuration loaded and validated successfully");

    let (persistence, queues) = match config.backend {
        PersistenceBackend::Postgres => {
            let pool = database::setup_database(&config).await?;
            (Persistence::postgres(pool.clone()), QueueSet::postgres(pool))
        }
        PersistenceBackend::Memory => {
            tracing::warn!("Using in-memory store and queues, state is lost on restart");
            (Persistence::in_memory(), QueueSet::in_memory())
        }
    };

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage")?;
    tracing::info!(backend = %storage.backend_type(), "Storage initialized");
    let signer = UrlSigner::new(storage, Duration::from_secs(config.signed_url_ttl_secs));

    let inference = HttpInferenceClient::new(config.inference.clone())
        .context("Failed to build inference client")?;

    let rate_limiter = InMemoryRateLimiter::new(
        config.rate_limit_max,
        Duration::from_millis(config.rate_limit_window_ms),
    );
    rate_limiter.spawn_cleanup();

    let coordinator = Coordinator::new(&config, persistence, queues, signer);
    let state = Arc::new(AppState::new(
        config.clone(),
        coordinator,
        Arc::new(inference),
        Arc::new(rate_limiter),
    ));

    let router = routes::setup_routes(&config, state.clone())?;
    let pools = workers::start_workers(&state);

    Ok((state, router, pools))
}
