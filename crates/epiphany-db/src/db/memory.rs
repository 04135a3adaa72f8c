//! In-memory implementation of every store trait
//!
//! Rows are kept in insertion order, so "newest first" is a reverse scan.
//! All writes for one call happen under a single lock, which gives the same
//! compare-and-set and cascade atomicity the PostgreSQL repositories provide.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use epiphany_core::models::{
    Asset, Event, EventFilter, EventType, Explain, Generation, GenerationOutput,
    GenerationStatus, NewAsset, NewExplain, NewGeneration, ACTIVE_STATUSES,
};

use super::store::{AssetStore, EventStore, ExplainStore, GenerationStore};

#[derive(Default)]
struct Tables {
    generations: Vec<Generation>,
    events: Vec<Event>,
    assets: Vec<Asset>,
    explains: Vec<Explain>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

fn page<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, offset: i64, limit: i64) -> Vec<T> {
    rows.rev()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_if<F>(&self, id: Uuid, expected: &[GenerationStatus], apply: F) -> bool
    where
        F: FnOnce(&mut Generation),
    {
        let mut tables = self.tables.write().await;
        match tables.generations.iter_mut().find(|g| g.id == id) {
            Some(g) if expected.contains(&g.status) => {
                apply(g);
                g.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl GenerationStore for InMemoryStore {
    async fn create(&self, new: NewGeneration) -> Result<Generation> {
        let now = Utc::now();
        let generation = Generation {
            id: Uuid::new_v4(),
            kind: new.kind,
            status: GenerationStatus::Queued,
            queue: new.queue,
            operation: new.operation,
            params: new.params,
            output_url: None,
            preview_urls: Vec::new(),
            duration_ms: None,
            model_hash: None,
            safety: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.generations.push(generation.clone());
        Ok(generation)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Generation>> {
        let tables = self.tables.read().await;
        Ok(tables.generations.iter().find(|g| g.id == id).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Generation>> {
        let tables = self.tables.read().await;
        Ok(page(tables.generations.iter().cloned(), offset, limit))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: &[GenerationStatus],
        next: GenerationStatus,
    ) -> Result<bool> {
        Ok(self.update_if(id, expected, |g| g.status = next).await)
    }

    async fn complete_success(&self, id: Uuid, output: &GenerationOutput) -> Result<bool> {
        let output = output.clone();
        Ok(self
            .update_if(id, ACTIVE_STATUSES, move |g| {
                g.status = GenerationStatus::Succeeded;
                g.output_url = output.output_url;
                g.preview_urls = output.preview_urls;
                g.duration_ms = output.duration_ms;
                g.model_hash = output.model_hash;
                g.safety = output.safety;
                g.error = None;
            })
            .await)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let error = error.to_string();
        Ok(self
            .update_if(id, ACTIVE_STATUSES, move |g| {
                g.status = GenerationStatus::Failed;
                g.error = Some(error);
            })
            .await)
    }

    async fn delete_cascade(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        tables.assets.retain(|a| a.generation_id != Some(id));
        tables.explains.retain(|e| e.generation_id != id);
        tables.events.retain(|e| e.generation_id != id);
        let before = tables.generations.len();
        tables.generations.retain(|g| g.id != id);
        Ok(tables.generations.len() < before)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn append(
        &self,
        generation_id: Uuid,
        event_type: EventType,
        payload: Value,
    ) -> Result<Event> {
        let event = Event {
            id: Uuid::new_v4(),
            generation_id,
            event_type,
            payload,
            created_at: Utc::now(),
        };
        self.tables.write().await.events.push(event.clone());
        Ok(event)
    }

    async fn list(&self, filter: &EventFilter, offset: i64, limit: i64) -> Result<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(page(
            tables.events.iter().filter(|e| filter.matches(e)).cloned(),
            offset,
            limit,
        ))
    }
}

#[async_trait]
impl AssetStore for InMemoryStore {
    async fn create_if_absent(&self, new: NewAsset) -> Result<(Asset, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .assets
            .iter()
            .find(|a| a.generation_id == Some(new.generation_id) && a.url == new.url)
        {
            return Ok((existing.clone(), false));
        }
        let asset = Asset {
            id: Uuid::new_v4(),
            generation_id: Some(new.generation_id),
            url: new.url,
            kind: new.kind,
            mime: new.mime,
            bytes: new.bytes,
            width: new.width,
            height: new.height,
            sha256: new.sha256,
            created_at: Utc::now(),
        };
        tables.assets.push(asset.clone());
        Ok((asset, true))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Asset>> {
        let tables = self.tables.read().await;
        Ok(tables.assets.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>> {
        let tables = self.tables.read().await;
        Ok(page(tables.assets.iter().cloned(), offset, limit))
    }

    async fn list_for_generation(&self, generation_id: Uuid) -> Result<Vec<Asset>> {
        let tables = self.tables.read().await;
        Ok(tables
            .assets
            .iter()
            .filter(|a| a.generation_id == Some(generation_id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.assets.len();
        tables.assets.retain(|a| a.id != id);
        Ok(tables.assets.len() < before)
    }
}

#[async_trait]
impl ExplainStore for InMemoryStore {
    async fn create(&self, new: NewExplain) -> Result<Explain> {
        let explain = Explain {
            id: Uuid::new_v4(),
            generation_id: new.generation_id,
            token_scores: new.token_scores,
            heatmap_urls: new.heatmap_urls,
            created_at: Utc::now(),
        };
        self.tables.write().await.explains.push(explain.clone());
        Ok(explain)
    }

    async fn latest(&self, generation_id: Uuid) -> Result<Option<Explain>> {
        let tables = self.tables.read().await;
        Ok(tables
            .explains
            .iter()
            .rev()
            .find(|e| e.generation_id == generation_id)
            .cloned())
    }

    async fn history(&self, generation_id: Uuid) -> Result<Vec<Explain>> {
        let tables = self.tables.read().await;
        Ok(tables
            .explains
            .iter()
            .rev()
            .filter(|e| e.generation_id == generation_id)
            .cloned()
            .collect())
    }
}
