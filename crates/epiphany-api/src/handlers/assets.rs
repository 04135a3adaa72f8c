use crate::coordinator::{DeleteResponse, Page, PageParams};
use crate::error::HttpAppError;
use crate::handlers::SignQuery;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use epiphany_core::models::Asset;
use std::sync::Arc;
use uuid::Uuid;

#[tracing::instrument(skip(state))]
pub async fn list_assets(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
    Query(sign): Query<SignQuery>,
) -> Result<Json<Page<Asset>>, HttpAppError> {
    Ok(Json(
        state.coordinator.list_assets(page, sign.options()).await?,
    ))
}

#[tracing::instrument(skip(state))]
pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, HttpAppError> {
    Ok(Json(state.coordinator.delete_asset(id).await?))
}
