//! Persistence store traits
//!
//! The coordinator only talks to these traits, so the PostgreSQL repositories
//! and the in-memory store are interchangeable.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use epiphany_core::models::{
    Asset, Event, EventFilter, EventType, Explain, Generation, GenerationOutput,
    GenerationStatus, NewAsset, NewExplain, NewGeneration,
};

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Insert a new row with status `queued`
    async fn create(&self, new: NewGeneration) -> Result<Generation>;

    async fn get(&self, id: Uuid) -> Result<Option<Generation>>;

    /// Newest first
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Generation>>;

    /// Compare-and-set on status. Returns false (and writes nothing) when the
    /// row is missing or its current status is not in `expected`.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[GenerationStatus],
        next: GenerationStatus,
    ) -> Result<bool>;

    /// `queued|running -> succeeded`, writing the output fields in the same statement
    async fn complete_success(&self, id: Uuid, output: &GenerationOutput) -> Result<bool>;

    /// `queued|running -> failed` with the error message
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool>;

    /// Delete asset, explain and event rows for the generation, then the
    /// generation itself, atomically. Returns false when the row did not exist.
    async fn delete_cascade(&self, id: Uuid) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, generation_id: Uuid, event_type: EventType, payload: Value)
        -> Result<Event>;

    /// Newest first
    async fn list(&self, filter: &EventFilter, offset: i64, limit: i64) -> Result<Vec<Event>>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Idempotent on `(generation_id, url)`: returns the existing row and
    /// `false` when the asset was already recorded.
    async fn create_if_absent(&self, new: NewAsset) -> Result<(Asset, bool)>;

    async fn get(&self, id: Uuid) -> Result<Option<Asset>>;

    /// Newest first
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>>;

    async fn list_for_generation(&self, generation_id: Uuid) -> Result<Vec<Asset>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ExplainStore: Send + Sync {
    async fn create(&self, new: NewExplain) -> Result<Explain>;

    /// Most recent explain row for the generation
    async fn latest(&self, generation_id: Uuid) -> Result<Option<Explain>>;

    /// Newest first
    async fn history(&self, generation_id: Uuid) -> Result<Vec<Explain>>;
}

/// The four stores the coordinator writes to
#[derive(Clone)]
pub struct Persistence {
    pub generations: Arc<dyn GenerationStore>,
    pub events: Arc<dyn EventStore>,
    pub assets: Arc<dyn AssetStore>,
    pub explains: Arc<dyn ExplainStore>,
}

impl Persistence {
    /// Process-local store, for tests and `BACKEND=memory`
    pub fn in_memory() -> Self {
        let store = Arc::new(crate::db::memory::InMemoryStore::new());
        Self {
            generations: store.clone(),
            events: store.clone(),
            assets: store.clone(),
            explains: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        use crate::db::{
            AssetRepository, EventRepository, ExplainRepository, GenerationRepository,
        };
        Self {
            generations: Arc::new(GenerationRepository::new(pool.clone())),
            events: Arc::new(EventRepository::new(pool.clone())),
            assets: Arc::new(AssetRepository::new(pool.clone())),
            explains: Arc::new(ExplainRepository::new(pool)),
        }
    }
}
