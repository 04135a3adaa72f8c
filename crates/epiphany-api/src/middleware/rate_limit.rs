use crate::error::HttpAppError;
use crate::utils::ip_extraction::extract_client_ip;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use epiphany_core::AppError;
use epiphany_infra::{RateLimitBackend, RateLimitDecision};
use std::net::SocketAddr;
use std::sync::Arc;

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(header_value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, header_value);
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    insert_header(headers, "X-RateLimit-Limit", decision.limit);
    insert_header(headers, "X-RateLimit-Window", decision.window_ms);
    insert_header(headers, "X-RateLimit-Remaining", decision.remaining);
    insert_header(headers, "X-RateLimit-Reset", decision.reset_ms);
}

/// Fixed-window limit per client address.
///
/// Every response carries the `X-RateLimit-*` headers. If the backend
/// itself fails the request is let through.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<dyn RateLimitBackend>>,
    request: Request,
    next: Next,
) -> Response {
    let socket_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = format!(
        "ip:{}",
        extract_client_ip(request.headers(), socket_addr.as_ref())
    );

    let decision = match rate_limiter.check(&key).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(error = %e, key = %key, "Rate limit backend failed, allowing request");
            return next.run(request).await;
        }
    };

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    tracing::warn!(
        key = %key,
        path = %request.uri().path(),
        limit = decision.limit,
        "Rate limit exceeded"
    );

    let mut response = HttpAppError(AppError::RateLimited {
        retry_after_secs: decision.retry_after_secs(),
    })
    .into_response();
    apply_headers(response.headers_mut(), &decision);
    response
}
