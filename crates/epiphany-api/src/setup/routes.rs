//! Route configuration and setup

use crate::constants::{API_PREFIX, MAX_BODY_BYTES};
use crate::error::error_request_id_middleware;
use crate::handlers::{assets, events, explain, generate, generations, jobs, system};
use crate::middleware::{
    api_key_middleware, rate_limit_middleware, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use epiphany_core::Config;
use epiphany_infra::REQUEST_ID_HEADER;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const EXPOSED_HEADERS: [&str; 6] = [
    REQUEST_ID_HEADER,
    "x-ratelimit-limit",
    "x-ratelimit-window",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
    "retry-after",
];

/// Build the `/v1` router with its middleware stack.
///
/// Liveness and version routes stay reachable without an API key.
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> anyhow::Result<Router> {
    let api_key: Option<Arc<str>> = config.api_key.as_deref().map(Arc::from);
    if api_key.is_none() {
        tracing::warn!("API_KEY not set, requests are not authenticated");
    }

    let api = public_routes()
        .merge(protected_routes().route_layer(axum::middleware::from_fn_with_state(
            api_key,
            api_key_middleware,
        )))
        .with_state(state.clone());

    let mut app = Router::new()
        .nest(API_PREFIX, api)
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    if let Some(cors) = setup_cors(config)? {
        app = app.layer(cors);
    }

    Ok(app
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(error_request_id_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware)))
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(system::health))
        .route("/ping", get(system::ping))
        .route("/version", get(system::version))
        .route("/time", get(system::time))
}

fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/enhance", post(generate::enhance_prompt))
        .route("/generate/image", post(generate::generate_image))
        .route("/generate/video", post(generate::generate_video))
        .route("/edit/{operation}", post(generate::edit))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/stream", get(jobs::stream_job))
        .route("/generations", get(generations::list_generations))
        .route(
            "/generations/{id}",
            get(generations::get_generation).delete(generations::delete_generation),
        )
        .route("/generations/{id}/job", get(generations::get_generation_job))
        .route("/generations/{id}/cancel", post(generations::cancel_generation))
        .route("/generations/{id}/retry", post(generations::retry_generation))
        .route("/events", get(events::list_events))
        .route("/assets", get(assets::list_assets))
        .route("/assets/{id}", axum::routing::delete(assets::delete_asset))
        .route("/explain/{generation_id}", get(explain::get_explain))
        .route("/explain/{generation_id}/history", get(explain::explain_history))
        .route("/explain/{generation_id}/refresh", post(explain::refresh_explain))
        .route("/queues", get(system::queues))
        .route("/config", get(system::config))
        .route("/uptime", get(system::uptime))
        .route("/rate-limit", get(system::rate_limit))
        .route("/system", get(system::system))
}

/// CORS for the web client; disabled when `WEB_ORIGIN` is unset
fn setup_cors(config: &Config) -> anyhow::Result<Option<CorsLayer>> {
    let Some(origin) = config.web_origin.as_deref() else {
        return Ok(None);
    };

    let exposed = EXPOSED_HEADERS
        .iter()
        .map(|h| HeaderName::from_bytes(h.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(crate::middleware::api_key::API_KEY_HEADER),
        ])
        .expose_headers(exposed);

    let cors = if origin.trim() == "*" {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        cors.allow_origin(Any)
    } else {
        let origin: HeaderValue = origin
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid WEB_ORIGIN {}: {}", origin, e))?;
        cors.allow_origin(origin)
    };
    Ok(Some(cors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_disabled_without_origin() {
        let config = Config::default();
        assert!(setup_cors(&config).unwrap().is_none());
    }

    #[test]
    fn test_cors_rejects_invalid_origin() {
        let config = Config {
            web_origin: Some("http://bad\norigin".to_string()),
            ..Config::default()
        };
        assert!(setup_cors(&config).is_err());
    }

    #[test]
    fn test_cors_accepts_origin() {
        let config = Config {
            web_origin: Some("http://localhost:3000".to_string()),
            ..Config::default()
        };
        assert!(setup_cors(&config).unwrap().is_some());
    }
}
