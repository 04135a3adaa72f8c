use crate::coordinator::{Page, PageParams};
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};
use epiphany_core::models::{Event, EventFilter, EventType};
use epiphany_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub generation_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

impl EventQuery {
    fn filter(&self) -> Result<EventFilter, AppError> {
        let event_type = match self.event_type.as_deref() {
            Some(t) => Some(
                t.parse::<EventType>()
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?,
            ),
            None => None,
        };
        Ok(EventFilter {
            generation_id: self.generation_id,
            event_type,
        })
    }
}

/// Audit trail, newest first, optionally filtered by generation and type
#[tracing::instrument(skip(state))]
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<Event>>, HttpAppError> {
    let page = state.coordinator.list_events(query.filter()?, page).await?;
    Ok(Json(page))
}
