use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use epiphany_core::models::{Event, EventFilter, EventType};

use super::store::EventStore;

#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for EventRepository {
    #[tracing::instrument(skip(self, payload), fields(generation.id = %generation_id, event = %event_type))]
    async fn append(
        &self,
        generation_id: Uuid,
        event_type: EventType,
        payload: Value,
    ) -> Result<Event> {
        sqlx::query_as::<Postgres, Event>(
            r#"
            INSERT INTO events (id, generation_id, type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id, generation_id, type, payload, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(generation_id)
        .bind(event_type.to_string())
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .context("Failed to append event")
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, filter: &EventFilter, offset: i64, limit: i64) -> Result<Vec<Event>> {
        sqlx::query_as::<Postgres, Event>(
            r#"
            SELECT id, generation_id, type, payload, created_at
            FROM events
            WHERE ($1::uuid IS NULL OR generation_id = $1)
                AND ($2::text IS NULL OR type = $2)
            ORDER BY seq DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.generation_id)
        .bind(filter.event_type.map(|t| t.to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list events")
    }
}
