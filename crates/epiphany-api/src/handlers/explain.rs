use crate::coordinator::SubmitResponse;
use crate::error::HttpAppError;
use crate::handlers::SignQuery;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use epiphany_core::models::Explain;
use std::sync::Arc;
use uuid::Uuid;

#[tracing::instrument(skip(state, sign))]
pub async fn get_explain(
    State(state): State<Arc<AppState>>,
    Path(generation_id): Path<Uuid>,
    Query(sign): Query<SignQuery>,
) -> Result<Json<Explain>, HttpAppError> {
    let explain = state
        .coordinator
        .get_explain(generation_id, sign.options())
        .await?;
    Ok(Json(explain))
}

#[tracing::instrument(skip(state))]
pub async fn explain_history(
    State(state): State<Arc<AppState>>,
    Path(generation_id): Path<Uuid>,
) -> Result<Json<Vec<Explain>>, HttpAppError> {
    Ok(Json(state.coordinator.explain_history(generation_id).await?))
}

#[tracing::instrument(skip(state))]
pub async fn refresh_explain(
    State(state): State<Arc<AppState>>,
    Path(generation_id): Path<Uuid>,
) -> Result<(StatusCode, Json<SubmitResponse>), HttpAppError> {
    let response = state.coordinator.refresh_explain(generation_id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
