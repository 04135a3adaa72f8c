use crate::error::HttpAppError;
use crate::handlers::SignQuery;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use epiphany_core::models::JobView;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

/// Job status across all queues, by queue job id
#[tracing::instrument(skip(state, query))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<SignQuery>,
) -> Result<Json<JobView>, HttpAppError> {
    let view = state
        .coordinator
        .get_status(&job_id, query.options())
        .await?;
    Ok(Json(view))
}

/// Server-sent progress snapshots until the job finishes or disappears
#[tracing::instrument(skip(state))]
pub async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("Progress stream opened");
    let events = state.coordinator.stream_progress(job_id).map(|snapshot| {
        let event = Event::default()
            .json_data(&snapshot)
            .unwrap_or_else(|_| Event::default().comment("unserializable snapshot"));
        Ok(event)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
