use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use epiphany_core::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_QUERY_PARAM: &str = "key";

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn query_key(request: &Request) -> Option<&str> {
    request.uri().query()?.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == API_KEY_QUERY_PARAM).then_some(value)
    })
}

/// Shared-key check. `None` disables the check.
///
/// The key is read from the `X-API-Key` header, or the `key` query
/// parameter for clients that cannot set headers (EventSource).
pub async fn api_key_middleware(
    State(expected): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| query_key(&request))
        .is_some_and(|key| secure_compare(key, &expected));

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Rejected request without a valid API key");
    HttpAppError(AppError::Unauthorized("Invalid or missing API key".to_string())).into_response()
}
