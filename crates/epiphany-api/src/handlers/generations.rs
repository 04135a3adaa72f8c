use crate::coordinator::{CancelResponse, DeleteResponse, Page, PageParams, SubmitResponse};
use crate::error::HttpAppError;
use crate::handlers::SignQuery;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use epiphany_core::models::{GenerationResponse, JobRef};
use std::sync::Arc;
use uuid::Uuid;

#[tracing::instrument(skip(state))]
pub async fn list_generations(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
    Query(sign): Query<SignQuery>,
) -> Result<Json<Page<GenerationResponse>>, HttpAppError> {
    let page = state
        .coordinator
        .list_generations(page, sign.options())
        .await?;
    Ok(Json(page))
}

#[tracing::instrument(skip(state, sign))]
pub async fn get_generation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(sign): Query<SignQuery>,
) -> Result<Json<GenerationResponse>, HttpAppError> {
    let generation = state.coordinator.get_generation(id, sign.options()).await?;
    Ok(Json(generation))
}

#[tracing::instrument(skip(state))]
pub async fn delete_generation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, HttpAppError> {
    tracing::info!(generation_id = %id, "Deleting generation");
    Ok(Json(state.coordinator.delete_generation(id).await?))
}

#[tracing::instrument(skip(state))]
pub async fn get_generation_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRef>, HttpAppError> {
    Ok(Json(state.coordinator.get_by_generation(id).await?))
}

#[tracing::instrument(skip(state))]
pub async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, HttpAppError> {
    Ok(Json(state.coordinator.cancel(id).await?))
}

#[tracing::instrument(skip(state))]
pub async fn retry_generation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SubmitResponse>), HttpAppError> {
    let response = state.coordinator.retry(id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
