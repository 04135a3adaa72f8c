//! Health, version and configuration endpoints

use crate::constants::{HEALTH_PROBE_TIMEOUT_SECS, SERVICE_NAME, STORAGE_HEALTH_KEY};
use crate::coordinator::QueueCountsView;
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use epiphany_core::models::QueueName;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

const HEALTHY: &str = "healthy";

/// Run one check with a timeout. Returns the status string
/// (`healthy`, `timeout` or `{prefix}: {error}`) and the elapsed milliseconds.
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> (String, u64)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let started = Instant::now();
    let status = match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => HEALTHY.to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    };
    (status, started.elapsed().as_millis() as u64)
}

fn record(services: &mut Map<String, Value>, name: &str, (status, ms): (String, u64)) {
    services.insert(name.to_string(), Value::String(status));
    services.insert(format!("{}_ms", name), json!(ms));
}

/// Probes the store, the queue, object storage and every inference worker.
/// Only the store and the queue decide the overall status.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let timeout = Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECS);
    let coordinator = &state.coordinator;
    let mut services = Map::new();

    let db = run_check(
        timeout,
        coordinator.persistence().generations.ping(),
        "unhealthy",
    )
    .await;
    let queue = run_check(
        timeout,
        async {
            coordinator
                .queues()
                .get(QueueName::GenerateImage)
                .counts()
                .await
                .map(drop)
        },
        "unhealthy",
    )
    .await;
    let ok = db.0 == HEALTHY && queue.0 == HEALTHY;
    record(&mut services, "db", db);
    record(&mut services, "queue", queue);

    let storage = coordinator.signer().storage().clone();
    record(
        &mut services,
        "storage",
        run_check(
            timeout,
            async move { storage.exists(STORAGE_HEALTH_KEY).await.map(drop) },
            "degraded",
        )
        .await,
    );

    for (name, queue) in [
        ("infer_image", QueueName::GenerateImage),
        ("infer_video", QueueName::GenerateVideo),
        ("edit", QueueName::EditImage),
        ("explain", QueueName::Explain),
    ] {
        let outcome = run_check(timeout, state.inference.health(queue), "degraded").await;
        record(&mut services, name, outcome);
    }

    if !ok {
        tracing::warn!(services = ?services, "Health check failed");
    }

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({ "ok": ok, "host": host, "services": services })),
    )
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
}

pub async fn version() -> Json<VersionResponse> {
    Json(version_info())
}

fn version_info() -> VersionResponse {
    VersionResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Non-secret configuration for the web client
fn public_config(state: &AppState) -> Value {
    let config = &state.config;
    json!({
        "webOrigin": config.web_origin,
        "allowNsfw": false,
        "rateLimit": {
            "max": config.rate_limit_max,
            "windowMs": config.rate_limit_window_ms,
        },
        "s3": {
            "endpoint": config.s3_endpoint,
            "region": config.s3_region,
            "bucket": config.s3_bucket,
            "inputsBucket": config.s3_inputs_bucket.as_ref().or(config.s3_bucket.as_ref()),
        },
    })
}

pub async fn config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(public_config(&state))
}

pub async fn rate_limit(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "max": state.rate_limiter.limit(),
        "windowMs": state.rate_limiter.window().as_millis() as u64,
    }))
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "pong": true }))
}

pub async fn time() -> Json<Value> {
    Json(json!({ "now": Utc::now() }))
}

pub async fn uptime(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime_ms = (Utc::now() - state.started_at).num_milliseconds().max(0);
    Json(json!({ "startedAt": state.started_at, "uptimeMs": uptime_ms }))
}

/// Health, version and config in one response
pub async fn system(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let config = public_config(&state);
    let (status, Json(health)) = health(State(state)).await;
    (
        status,
        Json(json!({ "health": health, "version": version_info(), "config": config })),
    )
}

/// Job counts per queue and queue-native state
#[tracing::instrument(skip(state))]
pub async fn queues(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QueueCountsView>>, HttpAppError> {
    Ok(Json(state.coordinator.queue_counts().await?))
}
